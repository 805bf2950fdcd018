//! Subcommand implementations.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use courier_core::app::{Courier, DOCUMENT_JOB, Enqueuer, HTTP_JOB, JobId, SweepHandle, SweepReport};
use courier_core::domain::{ArtifactRef, ExportFileRef, OutboxItem, OutboxKey, UploadBodyRef};
use courier_core::store::{OutboxCounts, OutboxStore};
use serde::Serialize;
use tracing::info;

use crate::{Outbox, OutputFormat, SweepTarget};

pub async fn enqueue(
    courier: &Courier,
    outbox: Outbox,
    subject: String,
    partition: Option<String>,
    file: String,
    override_id: Option<String>,
) -> anyhow::Result<()> {
    let key = match partition {
        Some(partition) => OutboxKey::with_partition(subject, partition),
        None => OutboxKey::new(subject),
    };

    // no scheduler here: the process exits right after, `sweep` or `run` delivers
    let status = match outbox {
        Outbox::Document => {
            let mut artifact = ExportFileRef::new(file);
            artifact.override_id = override_id;
            let store: Arc<dyn OutboxStore<ExportFileRef>> = courier.document_store().clone();
            let item = Enqueuer::new(store, JobId::new(DOCUMENT_JOB))
                .enqueue(key, artifact)
                .await?;
            format!("{} {}", item.key, item.status)
        }
        Outbox::Http => {
            let mut artifact = UploadBodyRef::new(file);
            artifact.override_id = override_id;
            let store: Arc<dyn OutboxStore<UploadBodyRef>> = courier.http_store().clone();
            let item = Enqueuer::new(store, JobId::new(HTTP_JOB))
                .enqueue(key, artifact)
                .await?;
            format!("{} {}", item.key, item.status)
        }
    };
    println!("queued {status}");
    Ok(())
}

pub async fn sweep(courier: &Courier, target: SweepTarget) -> anyhow::Result<()> {
    if matches!(target, SweepTarget::Document | SweepTarget::All) {
        let report = courier.document_driver().sweep().await;
        print_report("document", &report);
    }
    if matches!(target, SweepTarget::Http | SweepTarget::All) {
        let report = courier.http_driver().sweep().await;
        print_report("http", &report);
    }
    Ok(())
}

fn print_report(name: &str, report: &SweepReport) {
    if report.unconfigured {
        println!("{name}: not configured, skipped");
        return;
    }
    println!(
        "{name}: eligible={} sent={} failed={} skipped={} reclaimed={} pruned={} store_errors={}",
        report.eligible,
        report.sent,
        report.failed,
        report.skipped,
        report.reclaimed,
        report.pruned,
        report.store_errors,
    );
}

pub async fn status(courier: &Courier, format: OutputFormat) -> anyhow::Result<()> {
    let document = courier.document_store().get_all().await?;
    let http = courier.http_store().get_all().await?;
    let document_counts = courier.document_store().counts().await?;
    let http_counts = courier.http_store().counts().await?;

    match format {
        OutputFormat::Json => {
            let view = StatusView {
                document: OutboxView {
                    counts: document_counts,
                    items: &document,
                },
                http: OutboxView {
                    counts: http_counts,
                    items: &http,
                },
            };
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        OutputFormat::Text => {
            print_outbox("document", &document_counts, &document);
            print_outbox("http", &http_counts, &http);
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct StatusView<'a> {
    document: OutboxView<'a, ExportFileRef>,
    http: OutboxView<'a, UploadBodyRef>,
}

#[derive(Serialize)]
struct OutboxView<'a, R> {
    counts: OutboxCounts,
    items: &'a [OutboxItem<R>],
}

fn print_outbox<R: ArtifactRef>(name: &str, counts: &OutboxCounts, items: &[OutboxItem<R>]) {
    println!(
        "{name}: pending={} sending={} sent={} failed={}",
        counts.pending, counts.sending, counts.sent, counts.failed
    );
    for item in items {
        println!(
            "  {:<24} {:<8} attempts={:<3} {} {}",
            item.key.to_string(),
            item.status.as_str(),
            item.attempts,
            item.artifact.file_name(),
            item.last_error.as_deref().unwrap_or(""),
        );
    }
}

pub async fn run(courier: &Courier, interval_secs: u64) -> anyhow::Result<()> {
    let scheduler = courier.scheduler();
    let jobs = scheduler.job_ids();
    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    let mut pending: Vec<SweepHandle> = Vec::new();

    info!(jobs = jobs.len(), interval_secs, "courier running");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // 未開始の前回分は新しい要求に置き換えられる
                pending.retain(|handle| !handle.is_finished());
                for job in &jobs {
                    pending.push(scheduler.schedule(job)?);
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("waiting for ctrl-c")?;
                break;
            }
        }
    }

    info!("shutting down; waiting for in-flight sweeps");
    scheduler.shutdown();
    for handle in pending {
        let job = handle.job_id().clone();
        let outcome = handle.wait().await;
        info!(job = %job, outcome = ?outcome, "sweep request finished");
    }
    Ok(())
}

pub async fn prune(courier: &Courier, older_than_days: u64) -> anyhow::Result<()> {
    let age = Duration::from_secs(older_than_days.saturating_mul(86_400));
    let document = courier.document_store().prune_sent(age).await?;
    let http = courier.http_store().prune_sent(age).await?;
    println!("pruned document={document} http={http}");
    Ok(())
}
