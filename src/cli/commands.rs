use chrono::NaiveDate;

use crate::app::{AppContext, HeadwireError, Result};
use crate::domain::Headline;
use crate::fetcher::SectionStatus;
use crate::scheduler::CycleReport;

/// Run a single cycle through the scheduler and report it.
pub async fn refresh(ctx: &AppContext) -> Result<()> {
    let (handle, task) = ctx.start_scheduler();
    let mut cycles = handle.subscribe();
    if !ctx.config().refresh.on_start {
        handle.trigger_refresh();
    }

    cycles
        .wait_for(|done| *done >= 1)
        .await
        .map_err(|e| HeadwireError::Other(e.to_string()))?;
    let status = handle.status();
    handle.shutdown();
    let _ = task.await;

    match status.last_cycle {
        Some(report) => print_report(&report),
        None => println!("No refresh completed"),
    }
    Ok(())
}

/// Refresh on the configured interval until interrupted.
pub async fn run(ctx: &AppContext) -> Result<()> {
    let (handle, task) = ctx.start_scheduler();
    let mut cycles = handle.subscribe();
    println!(
        "Refreshing {} sections every {} min (Ctrl-C to stop)",
        ctx.config().fetch.sections.len(),
        ctx.config().refresh.interval().as_secs() / 60
    );

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            changed = cycles.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = handle.status();
                if let Some(report) = &status.last_cycle {
                    let next = status
                        .next_run
                        .map(|t| t.format("%H:%M:%S").to_string())
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{} {} headlines, {} unseen, next at {}",
                        if report.committed { "ok " } else { "ERR" },
                        report.headline_count,
                        status.unseen,
                        next
                    );
                }
            }
        }
    }

    handle.shutdown();
    let _ = task.await;
    println!("Stopped");
    Ok(())
}

pub async fn stats(ctx: &AppContext, json: bool) -> Result<()> {
    let stats = ctx.diagnostics().await;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let or_dash = |value: Option<String>| value.unwrap_or_else(|| "-".to_string());
    println!("Backend:    {} ({})", stats.backend, if stats.available { "available" } else { "unavailable" });
    println!("Latency:    {}", or_dash(stats.latency_ms.map(|ms| format!("{:.1} ms", ms))));
    println!("Key:        {}", stats.cache_key);
    println!("Present:    {}", or_dash(stats.key_present.map(|p| p.to_string())));
    println!("TTL:        {}", or_dash(stats.ttl_seconds.map(|s| format!("{}s", s))));
    println!("Payload:    {}", or_dash(stats.payload_bytes.map(|b| format!("{} bytes", b))));
    println!("Headlines:  {} ({} summarized)", stats.headline_count, stats.summary_count);
    println!("Sections:   {}", stats.sections.join(", "));
    println!("Snapshots:  {}", or_dash(stats.historical_snapshot_count.map(|n| n.to_string())));
    if let Some(title) = &stats.latest_headline_title {
        println!("Latest:     {}", title);
    }
    for warning in &stats.warnings {
        eprintln!("  ! {}", warning);
    }
    Ok(())
}

pub async fn history(ctx: &AppContext, days: u32, date: Option<NaiveDate>) -> Result<()> {
    if let Some(date) = date {
        match ctx.load_snapshot(date).await {
            Some(headlines) => print_headlines(&headlines),
            None => println!("No snapshot for {}", date),
        }
        return Ok(());
    }

    let snapshots = ctx.list_snapshots(days).await;
    if snapshots.is_empty() {
        println!("No snapshots in the last {} days", days);
        return Ok(());
    }
    for snapshot in snapshots {
        println!(
            "{}  {} headlines, captured {}",
            snapshot.date,
            snapshot.headline_count,
            snapshot.captured_at.format("%H:%M UTC")
        );
    }
    Ok(())
}

pub async fn clear(ctx: &AppContext) -> Result<()> {
    let outcome = ctx.clear_cache().await;
    if !outcome.success {
        return Err(HeadwireError::BackendUnavailable(outcome.message));
    }
    println!("{}", outcome.message);
    Ok(())
}

pub async fn summary(ctx: &AppContext, url: &str, title: Option<&str>) -> Result<()> {
    let headline = Headline::new("", title.unwrap_or(url), url);
    let record = ctx.resolve_summary(&headline).await;

    println!("{}", record.text);
    if let Some(issue) = record.issue.filter(|_| record.is_fallback) {
        eprintln!("\n(fallback: {})", issue.as_str());
    }
    Ok(())
}

fn print_report(report: &CycleReport) {
    for section in &report.sections {
        let line = match &section.status {
            SectionStatus::Fetched { count } => format!("{} headlines", count),
            SectionStatus::Failed { reason } => format!("failed: {}", reason),
            SectionStatus::PreservedPrior { count, reason } => {
                format!("kept {} previous headlines ({})", count, reason)
            }
        };
        println!("  {}: {} [{} attempts]", section.label, line, section.attempts);
    }

    if report.committed {
        println!(
            "Refresh complete: {} headlines in {} ms",
            report.headline_count, report.duration_ms
        );
    } else {
        eprintln!("Refresh failed: no section could be fetched, previous headlines kept");
    }
}

fn print_headlines(headlines: &[Headline]) {
    for headline in headlines {
        let source = headline.source.as_deref().unwrap_or("");
        println!("[{}] {} {}", headline.section, headline.title, source);
        println!("  {}", headline.url);
    }
}
