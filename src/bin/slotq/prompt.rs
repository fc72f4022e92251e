//! Line-oriented terminal collaborator

use slotq::coordinator::{Collaborator, CountRequest, Role, StatusPoint, TurnEvent};
use slotq::spawn::TurnOutcome;
use slotq::{Result, SlotqError};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::os::fd::AsFd;

/// Stdin without read-ahead
///
/// A forked consumer inherits a copy of any userspace buffer, so both
/// processes would see the same pending input. Reading straight from the
/// descriptor keeps consumed bytes consumed for everyone.
pub struct RawStdin;

impl Read for RawStdin {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let stdin = io::stdin();
        rustix::io::read(stdin.as_fd(), buf).map_err(io::Error::from)
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::Producer => "Producer",
        Role::Consumer => "Consumer",
    }
}

/// Prompts on `output`, reads answers from `input`
pub struct PromptCollaborator<R, W> {
    input: R,
    output: W,
}

impl PromptCollaborator<BufReader<RawStdin>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(BufReader::with_capacity(1, RawStdin), io::stdout())
    }
}

impl<R: BufRead, W: Write> PromptCollaborator<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    #[cfg(test)]
    pub fn into_output(self) -> W {
        self.output
    }

    fn say(&mut self, text: &str) {
        let _ = self.output.write_all(text.as_bytes());
        let _ = self.output.flush();
    }

    fn sayln(&mut self, text: &str) {
        self.say(text);
        self.say("\n");
    }

    /// Next line without its terminator, `None` at end of input
    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim_end_matches(['\r', '\n']).to_string()),
        }
    }
}

impl<R: BufRead, W: Write> Collaborator for PromptCollaborator<R, W> {
    fn read_count(&mut self, request: CountRequest) -> Result<u32> {
        let prompt = match request {
            CountRequest::Produce { free } => {
                format!("Producer: Enter number of items to add (space left: {}): ", free)
            }
            CountRequest::Consume { available } => {
                format!("Consumer: Enter number of items to consume (available: {}): ", available)
            }
        };
        self.say(&prompt);

        let line = self
            .read_line()
            .ok_or_else(|| SlotqError::InvalidInput("end of input".into()))?;
        let trimmed = line.trim();
        trimmed
            .parse::<u32>()
            .map_err(|_| {
                SlotqError::InvalidInput(format!("'{}' is not a non-negative integer", trimmed))
            })
    }

    fn read_values(&mut self, count: usize) -> Result<Vec<i32>> {
        self.sayln(&format!("Producer: Enter {} values:", count));

        let mut values = Vec::with_capacity(count);
        while values.len() < count {
            self.say(&format!("  Enter value #{}: ", values.len() + 1));
            let line = self
                .read_line()
                .ok_or_else(|| SlotqError::InvalidInput("end of input".into()))?;
            match line.trim().parse::<i32>() {
                Ok(value) => values.push(value),
                Err(_) => self.sayln("Producer: Invalid input for value. Try again."),
            }
        }
        Ok(values)
    }

    fn read_continue(&mut self) -> bool {
        self.say(
            "\nContinue Producer-Consumer loop? (enter 'y' to continue, any other key to exit): ",
        );
        match self.read_line() {
            Some(line) => matches!(line.trim_start().chars().next(), Some('y' | 'Y')),
            None => false,
        }
    }

    fn report(&mut self, event: TurnEvent) {
        let text = match event {
            TurnEvent::Status { point, snapshot } => {
                let label = match point {
                    StatusPoint::Initialized => "Queue status after initialization:",
                    StatusPoint::Resumed => "Queue status of existing segment:",
                    StatusPoint::AfterProducer => "Queue status after Producer:",
                    StatusPoint::AfterConsumer => "Queue status after Consumer (from Parent):",
                };
                format!("{}\n{}", label, snapshot)
            }
            TurnEvent::IterationStarted(_) => {
                "\n================ NEW LOOP ================".to_string()
            }
            TurnEvent::TurnStarted(Role::Producer) => {
                "--- Producer Phase (Parent Process) ---".to_string()
            }
            TurnEvent::TurnStarted(Role::Consumer) => {
                "\n--- Consumer Phase (Child Process) ---".to_string()
            }
            TurnEvent::QueueFull => "Producer: Queue is full. Cannot add more items.".to_string(),
            TurnEvent::QueueEmpty => "Consumer: Queue is empty. Nothing to consume.".to_string(),
            TurnEvent::InvalidInput { role, reason } => {
                format!("{}: Invalid input ({}).", role_name(role), reason)
            }
            TurnEvent::NothingRequested(Role::Producer) => "Producer: No items added.".to_string(),
            TurnEvent::NothingRequested(Role::Consumer) => {
                "Consumer: No items consumed.".to_string()
            }
            TurnEvent::Truncated { role: Role::Producer, requested, accepted } => format!(
                "Producer: Input ({}) exceeds available space, will add up to {} items.",
                requested, accepted
            ),
            TurnEvent::Truncated { role: Role::Consumer, requested, accepted } => format!(
                "Consumer: Requested ({}) exceeds available ({}). Consuming all available items.",
                requested, accepted
            ),
            TurnEvent::Appended { stored } => {
                format!("Producer: Finished adding {} items.", stored)
            }
            TurnEvent::Removed { removed } => {
                format!("Consumer: Consumed {} items from the end of the queue.", removed)
            }
            TurnEvent::ConsumerJoined { parent, consumer, outcome } => {
                let status = match outcome {
                    TurnOutcome::NormalExit(code) => {
                        format!("Child (Consumer) finished with exit code {}.", code)
                    }
                    TurnOutcome::AbnormalTermination => {
                        "Child (Consumer) terminated abnormally.".to_string()
                    }
                };
                format!("\nParent (PID: {}) joined Child ({}).\n{}", parent, consumer, status)
            }
            TurnEvent::ShuttingDown => "\nProgram ending. Cleaning up shared memory...".to_string(),
            TurnEvent::CleanupDone { clean: true } => "Cleanup done! Exit program".to_string(),
            TurnEvent::CleanupDone { clean: false } => {
                "Cleanup finished with errors. Exit program".to_string()
            }
        };
        self.sayln(&text);
    }
}
