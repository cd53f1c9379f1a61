mod render;

use clap::Parser;
use console::{Key, Term};
use std::collections::VecDeque;
use std::path::PathBuf;
use zenoh_duel::{SessionCommand, SessionExt, SessionHandle, StepResult};

/// z_tictactoe - two-player tic-tac-toe over a zenoh relay
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Player name
    #[arg(short, long)]
    name: Option<String>,

    /// Key expression prefix
    #[arg(short, long)]
    prefix: Option<String>,

    /// Join the session with this code instead of waiting for a key
    #[arg(short, long)]
    join: Option<String>,

    /// Host a session right away
    #[arg(long)]
    host: bool,

    /// Path to Zenoh config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Map a key to a session command
///
/// Digits 1-9 address the cells row by row.
fn command_for(key: &Key) -> Option<SessionCommand> {
    match key {
        Key::Char(c @ '1'..='9') => {
            let index = c.to_digit(10)? as usize - 1;
            Some(SessionCommand::Move {
                row: index / 3,
                col: index % 3,
            })
        }
        Key::Char('h') | Key::Char('H') => Some(SessionCommand::Host),
        Key::Char('r') | Key::Char('R') => Some(SessionCommand::Ready),
        Key::Char('c') | Key::Char('C') => Some(SessionCommand::Reconnect),
        Key::Char('n') | Key::Char('N') => Some(SessionCommand::Restart),
        Key::Char('d') | Key::Char('D') => Some(SessionCommand::Disconnect),
        Key::Char('l') | Key::Char('L') => Some(SessionCommand::Leave),
        Key::Char('q') | Key::Char('Q') => Some(SessionCommand::Quit),
        _ => None,
    }
}

/// Turn key presses into commands until `send` declines or input fails
///
/// A failing `read_key` (no terminal) ends the loop; the session keeps
/// running without keyboard input.
fn forward_keys<K, L, S>(mut read_key: K, mut read_line: L, mut send: S)
where
    K: FnMut() -> std::io::Result<Key>,
    L: FnMut() -> std::io::Result<String>,
    S: FnMut(SessionCommand) -> bool,
{
    while let Ok(key) = read_key() {
        let command = match key {
            Key::Char('j') | Key::Char('J') => read_line().ok().map(SessionCommand::Join),
            key => command_for(&key),
        };
        if let Some(command) = command {
            if !send(command) {
                break;
            }
        }
    }
}

/// Append to the on-screen log, keeping only what is rendered
fn push_log(log: &mut VecDeque<String>, line: String) {
    log.push_back(line);
    while log.len() > render::LOG_LINES {
        log.pop_front();
    }
}

fn dispatch(handle: &SessionHandle, command: SessionCommand) -> zenoh_duel::Result<()> {
    match command {
        SessionCommand::Host => handle.host_game(),
        SessionCommand::Join(code) => handle.join_game(code),
        SessionCommand::Ready => handle.submit_ready(),
        SessionCommand::Move { row, col } => handle.submit_move(row, col),
        SessionCommand::Reconnect => handle.request_reconnect(),
        SessionCommand::Finish(outcome) => handle.finish_game(outcome),
        SessionCommand::Restart => handle.restart(),
        SessionCommand::Leave => handle.leave(),
        SessionCommand::Disconnect => handle.drop_connection(),
        SessionCommand::Quit => handle.quit(),
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 1)]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt::init();

    let zenoh_config = match args.config {
        Some(path) => zenoh::Config::from_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config file: {}", e))?,
        None => zenoh::Config::default(),
    };
    let zenoh = zenoh::open(zenoh_config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open zenoh session: {}", e))?;

    let mut builder = zenoh.declare_duel_session();
    if let Some(name) = args.name.clone() {
        builder = builder.name(name)?;
    }
    if let Some(prefix) = args.prefix.clone() {
        builder = builder.prefix(prefix);
    }
    let mut session = builder.await?;
    let handle = session.handle();

    println!("=== z_tictactoe ===");
    println!("Player: {}", session.id());
    if let Some(code) = args.join.clone() {
        handle.join_game(code)?;
    } else if args.host {
        handle.host_game()?;
    }

    // Keyboard input runs on a blocking thread with its own terminal
    let keyboard = handle.clone();
    let keyboard_task = tokio::task::spawn_blocking(move || {
        let input_term = Term::stdout();
        forward_keys(
            || input_term.read_key(),
            || {
                let _ = input_term.write_str("Join code: ");
                input_term.read_line()
            },
            |command| {
                let quit = command == SessionCommand::Quit;
                dispatch(&keyboard, command).is_ok() && !quit
            },
        );
    });

    let render_term = Term::stdout();
    let mut log: VecDeque<String> = VecDeque::with_capacity(render::LOG_LINES + 1);
    loop {
        match session.step().await? {
            StepResult::Stop => break,
            StepResult::Signals(signals) => {
                for signal in signals {
                    push_log(&mut log, format!("* {}", signal));
                }
            }
            StepResult::Rejected(e) => push_log(&mut log, format!("! {}", e)),
            StepResult::Timeout => {}
        }

        render_term.clear_screen()?;
        for line in render::render(&session.info(), log.make_contiguous()) {
            render_term.write_line(&line)?;
        }
        render_term.flush()?;
    }

    keyboard_task.abort();
    let _ = keyboard_task.await;

    println!("Bye!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digit_keys_map_to_cells() {
        assert_eq!(
            command_for(&Key::Char('1')),
            Some(SessionCommand::Move { row: 0, col: 0 })
        );
        assert_eq!(
            command_for(&Key::Char('6')),
            Some(SessionCommand::Move { row: 1, col: 2 })
        );
        assert_eq!(
            command_for(&Key::Char('9')),
            Some(SessionCommand::Move { row: 2, col: 2 })
        );
        assert_eq!(command_for(&Key::Char('0')), None);
    }

    #[test]
    fn test_log_keeps_a_bounded_tail() {
        let mut log = VecDeque::new();
        for i in 0..100 {
            push_log(&mut log, format!("line {}", i));
        }
        assert_eq!(log.len(), render::LOG_LINES);
        assert_eq!(log.front().map(String::as_str), Some("line 94"));
        assert_eq!(log.back().map(String::as_str), Some("line 99"));
    }

    fn scripted(keys: Vec<Key>) -> impl FnMut() -> std::io::Result<Key> {
        let mut keys = keys.into_iter();
        move || {
            keys.next()
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "not a terminal"))
        }
    }

    #[test]
    fn test_keys_stop_when_input_fails() {
        let mut sent = Vec::new();
        forward_keys(
            scripted(vec![Key::Char('r'), Key::Char('x'), Key::Char('j')]),
            || Ok("Ab12Cd".to_string()),
            |command| {
                sent.push(command);
                true
            },
        );
        assert_eq!(
            sent,
            vec![SessionCommand::Ready, SessionCommand::Join("Ab12Cd".to_string())]
        );
    }

    #[test]
    fn test_keys_stop_when_send_declines() {
        let mut sent = Vec::new();
        forward_keys(
            scripted(vec![Key::Char('q'), Key::Char('r')]),
            || Ok(String::new()),
            |command| {
                sent.push(command);
                false
            },
        );
        assert_eq!(sent, vec![SessionCommand::Quit]);
    }

    #[test]
    fn test_letter_keys() {
        assert_eq!(command_for(&Key::Char('R')), Some(SessionCommand::Ready));
        assert_eq!(command_for(&Key::Char('c')), Some(SessionCommand::Reconnect));
        assert_eq!(command_for(&Key::Escape), None);
    }
}
