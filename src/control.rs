//! Interactive control loop.
//!
//! The foreground task: reads operator commands from stdin, mutates the
//! shared run state, and drives publish bursts. While a burst is running no
//! new commands are serviced; `quit` enters the terminal shutdown state,
//! tearing down publisher connections and signalling the background loop.

use crate::publisher::PublisherDriver;
use crate::state::SharedState;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

/// Recognized operator commands.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Results,
    Reset,
    Run,
    /// One burst of the given message count, overriding `num_messages`
    /// for that burst only.
    RunRange(usize),
    SetNumSubscribers(usize),
    SetNumPublishers(usize),
    SetNumMessages(usize),
    SetSecondsBetweenPublishes(f64),
    ShowSettings,
    Quit,
}

/// Parse one input line.
///
/// `Ok(None)` for empty input (ignored); `Err` carries the operator-facing
/// message for unrecognized or malformed input, which mutates no state.
pub fn parse_command(input: &str) -> Result<Option<Command>, String> {
    let mut tokens = input.split_whitespace();
    let Some(name) = tokens.next() else {
        return Ok(None);
    };
    let arg = tokens.next();
    if tokens.next().is_some() {
        return Err(format!("too many arguments for command: {}", name));
    }

    let no_arg = |cmd: Command| match arg {
        None => Ok(Some(cmd)),
        Some(_) => Err(format!("command takes no argument: {}", name)),
    };
    // Validation applies to the argument token only.
    let usize_arg = || -> Result<usize, String> {
        let token = arg.ok_or_else(|| format!("command requires a count: {}", name))?;
        token
            .parse::<usize>()
            .map_err(|_| format!("not a valid count: {:?}", token))
    };

    match name {
        "help" => no_arg(Command::Help),
        "results" => no_arg(Command::Results),
        "reset" => no_arg(Command::Reset),
        "run" => no_arg(Command::Run),
        "show-settings" => no_arg(Command::ShowSettings),
        "quit" | "exit" => no_arg(Command::Quit),
        "run-range" => Ok(Some(Command::RunRange(usize_arg()?))),
        "set-num-subscribers" => Ok(Some(Command::SetNumSubscribers(usize_arg()?))),
        "set-num-publishers" => Ok(Some(Command::SetNumPublishers(usize_arg()?))),
        "set-num-messages" => Ok(Some(Command::SetNumMessages(usize_arg()?))),
        "set-seconds-between-publishes" => {
            let token = arg.ok_or_else(|| format!("command requires a value: {}", name))?;
            let value = crate::cli::parse_positive_f64(token)?;
            Ok(Some(Command::SetSecondsBetweenPublishes(value)))
        }
        other => Err(format!("unrecognized command: {}", other)),
    }
}

const MENU: &str = "\
Test Runner Menu

  help - Show this help
  results - See results of the test
  reset - Reset results
  run - Run a burst with the current settings
  run-range <N> - Run one burst of N messages
  set-num-subscribers <N> - Set the desired subscriber worker count
  set-num-publishers <N> - Set the desired publisher connection count
  set-num-messages <N> - Set messages per burst
  set-seconds-between-publishes <F> - Set the inter-message interval
  show-settings - Show the current settings
  exit - Close the program down
";

/// Control-loop state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Ready,
    RunningBurst,
    ShuttingDown,
}

/// Whether the loop continues after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Shutdown,
}

/// The interactive command interpreter.
pub struct ControlLoop {
    shared: Arc<SharedState>,
    driver: PublisherDriver,
    state: LoopState,
}

impl ControlLoop {
    pub fn new(shared: Arc<SharedState>, driver: PublisherDriver) -> Self {
        Self {
            shared,
            driver,
            state: LoopState::Ready,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Read and service commands until shutdown.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        println!("{}", MENU);
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("> ");
            std::io::stdout().flush()?;
            let Some(line) = lines.next_line().await? else {
                // stdin closed: treat as quit
                break;
            };
            match parse_command(&line) {
                Ok(Some(command)) => {
                    if self.handle_command(command).await == Flow::Shutdown {
                        break;
                    }
                }
                Ok(None) => {}
                Err(message) => println!("{}", message),
            }
        }
        self.shutdown().await;
        Ok(())
    }

    /// Service one command. Each handler performs a single atomic mutation
    /// of shared state.
    pub async fn handle_command(&mut self, command: Command) -> Flow {
        match command {
            Command::Help => {
                println!("{}", MENU);
            }
            Command::Results => {
                self.shared.request_show();
            }
            Command::Reset => {
                self.shared.request_reset();
            }
            Command::Run => {
                let settings = self.shared.settings();
                self.run_burst(settings.num_messages, settings.seconds_between_publishes)
                    .await;
            }
            Command::RunRange(count) => {
                let settings = self.shared.settings();
                self.run_burst(count, settings.seconds_between_publishes)
                    .await;
            }
            Command::SetNumSubscribers(count) => {
                self.shared.update_settings(|s| s.num_subscribers = count);
            }
            Command::SetNumPublishers(count) => {
                self.shared.update_settings(|s| s.num_publishers = count);
            }
            Command::SetNumMessages(count) => {
                self.shared.update_settings(|s| s.num_messages = count);
            }
            Command::SetSecondsBetweenPublishes(value) => {
                self.shared
                    .update_settings(|s| s.seconds_between_publishes = value);
            }
            Command::ShowSettings => {
                let settings = self.shared.settings();
                println!(
                    "subscribers: {}  publishers: {}  messages: {}  interval: {}s",
                    settings.num_subscribers,
                    settings.num_publishers,
                    settings.num_messages,
                    settings.seconds_between_publishes,
                );
            }
            Command::Quit => {
                self.state = LoopState::ShuttingDown;
                return Flow::Shutdown;
            }
        }
        Flow::Continue
    }

    /// Execute one burst inline; no new commands are serviced meanwhile.
    async fn run_burst(&mut self, message_count: usize, interval_seconds: f64) {
        let publishers = self.shared.settings().num_publishers;
        if let Err(e) = self.driver.ensure(publishers).await {
            error!("could not open publisher connections: {:#}", e);
            return;
        }
        self.state = LoopState::RunningBurst;
        info!(
            messages = message_count,
            publishers = self.driver.live_connections(),
            "starting burst"
        );
        self.driver
            .publish_burst(message_count, Duration::from_secs_f64(interval_seconds))
            .await;
        self.state = LoopState::Ready;
    }

    /// Terminal teardown: signal the background loop and close connections.
    async fn shutdown(&mut self) {
        self.state = LoopState::ShuttingDown;
        self.shared.shutdown();
        self.driver.close_all().await;
        info!("control loop shut down");
    }
}
