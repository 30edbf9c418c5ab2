//! Session CLI commands: status, connect, terminate.

use anyhow::Result;
use console::style;
use tokio::sync::broadcast::error::RecvError;

use voltura_types::event::DomainEvent;
use voltura_types::session::{SessionSnapshot, SessionStatus};

use crate::state::AppState;

/// Print a session's current status.
///
/// # Examples
///
/// ```bash
/// voltura session status primary
/// voltura session status primary --json
/// ```
pub async fn status(state: &AppState, id: &str, json: bool) -> Result<()> {
    let snapshot = state.registry.status(id).await?;
    print_snapshot(&snapshot, json)
}

/// Connect a session. When a pairing code is needed, print each code as it
/// arrives and wait until the session opens, closes, or Ctrl+C.
pub async fn connect(state: &AppState, id: &str, json: bool) -> Result<()> {
    let mut events = state.events.subscribe();
    state.registry.get_or_create(id).await?;
    let snapshot = state.registry.status(id).await?;
    print_snapshot(&snapshot, json)?;

    if snapshot.status != SessionStatus::AwaitingPairing {
        return Ok(());
    }
    if !json {
        println!(
            "  {}",
            style("Waiting for the code to be scanned (Ctrl+C to stop)...").dim()
        );
    }

    loop {
        let event = tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => event,
        };
        match event {
            Ok(DomainEvent::SessionPairing { session_id, payload }) if session_id == id => {
                if json {
                    println!("{}", serde_json::json!({ "session_id": id, "pairing_payload": payload }));
                } else {
                    println!("  {} New pairing code:", style("↻").yellow());
                    println!("  {}", style(payload).yellow());
                }
            }
            Ok(DomainEvent::SessionConnected { session_id }) if session_id == id => {
                let snapshot = state.registry.status(id).await?;
                print_snapshot(&snapshot, json)?;
                break;
            }
            Ok(DomainEvent::SessionDisconnected {
                session_id, reason, ..
            }) if session_id == id => {
                anyhow::bail!("session '{id}' closed: {reason}");
            }
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break,
        }
    }
    Ok(())
}

/// Terminate a session and print its final status.
pub async fn terminate(state: &AppState, id: &str, json: bool) -> Result<()> {
    state.registry.terminate(id).await?;
    let snapshot = state.registry.status(id).await?;
    print_snapshot(&snapshot, json)
}

fn print_snapshot(snapshot: &SessionSnapshot, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(snapshot)?);
        return Ok(());
    }

    let status = match snapshot.status {
        SessionStatus::Connected => style(snapshot.status.to_string()).green(),
        SessionStatus::AwaitingPairing => style(snapshot.status.to_string()).yellow(),
        SessionStatus::LoggedOut => style(snapshot.status.to_string()).red(),
        _ => style(snapshot.status.to_string()).dim(),
    };

    println!();
    println!("  Session '{}'", style(&snapshot.id).cyan().bold());
    println!("  Status:      {status}");
    println!(
        "  Last synced: {}",
        snapshot
            .last_synced_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string())
    );
    if let Some(payload) = &snapshot.pairing_payload {
        println!("  Pairing code:");
        println!("  {}", style(payload).yellow());
    }
    println!();
    Ok(())
}
