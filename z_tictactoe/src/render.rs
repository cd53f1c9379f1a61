//! Terminal rendering of a session snapshot

use console::style;
use zenoh_duel::{Outcome, Phase, Role, SessionInfo};

/// Number of signal lines kept on screen
pub const LOG_LINES: usize = 6;

/// Key hints for the current phase
fn hints(info: &SessionInfo) -> &'static str {
    if info.link_lost {
        return "c reconnect, l leave, q quit";
    }
    match info.phase {
        Phase::Idle => "h host, j join, q quit",
        Phase::Joining | Phase::Hosted | Phase::WaitingForPeer => "l leave, q quit",
        Phase::ReadyHandshake => "r ready, d drop, l leave, q quit",
        Phase::Active => "1-9 move, d drop, l leave, q quit",
        Phase::Finished => "n restart, l leave, q quit",
    }
}

fn outcome_line(info: &SessionInfo) -> Option<String> {
    if !info.state.game_finished {
        return None;
    }
    let line = match (info.state.outcome, info.role) {
        (Outcome::Draw, _) => style("Draw").yellow().to_string(),
        (outcome, Some(role)) if outcome == Outcome::won_by(role) => {
            style("You won").green().bold().to_string()
        }
        (Outcome::Player1Won | Outcome::Player2Won, Some(_)) => {
            style("You lost").red().bold().to_string()
        }
        (outcome, _) => outcome.to_string(),
    };
    Some(line)
}

/// Render the session status, board and recent signals
pub fn render(info: &SessionInfo, log: &[String]) -> Vec<String> {
    let mut lines = vec![style(info.to_string()).bold().to_string()];

    if let Some(role) = info.role {
        let name = match role {
            Role::Host => "host",
            Role::Client => "client",
        };
        lines.push(format!("You play {} as {}", role.mark(), name));
    }

    if info.link_lost {
        let remaining = info
            .client_grace_remaining
            .map(|d| format!("{}s left to reconnect", d.as_secs()))
            .unwrap_or_else(|| "checking session...".to_string());
        lines.push(style(format!("Connection lost, {}", remaining)).red().to_string());
    } else if info.state.disconnected {
        lines.push(
            style(format!(
                "Opponent disconnected, {}s left",
                info.state.grace_period_remaining.as_secs()
            ))
            .yellow()
            .to_string(),
        );
    }

    if matches!(info.phase, Phase::Active | Phase::Finished) {
        lines.push(String::new());
        lines.extend(info.board().to_string().lines().map(str::to_string));
        lines.push(String::new());
    }
    if let Some(line) = outcome_line(info) {
        lines.push(line);
    }

    lines.push(style(hints(info)).dim().to_string());
    lines.push(String::new());
    let start = log.len().saturating_sub(LOG_LINES);
    lines.extend(log[start..].iter().cloned());
    lines
}
