//! External-tool command types
//!
//! A [`CommandDescriptor`] describes one invocation of the containerized
//! toolkit before it runs; a [`CommandResult`] is what comes back. Both are
//! plain values scoped to a single invocation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single tool parameter
///
/// A parameter travels through exactly one channel: either it is rendered
/// into the command line, or (when `environment_variable` is set) it is
/// exported into the container environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandParameter {
    pub name: String,
    pub value: String,
    pub flag: bool,
    pub environment_variable: bool,
}

impl CommandParameter {
    /// A `<name> <value>` command-line option
    pub fn option(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            flag: false,
            environment_variable: false,
        }
    }

    /// A bare `<name>` switch
    pub fn flag(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: String::new(),
            flag: true,
            environment_variable: false,
        }
    }

    /// A `name=value` binding exported into the container environment
    pub fn env(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            flag: false,
            environment_variable: true,
        }
    }

    /// Renders the parameter as it appears on the command line
    pub fn render(&self) -> String {
        if self.flag {
            self.name.clone()
        } else {
            format!("{} {}", self.name, self.value)
        }
    }
}

/// Immutable description of one external-tool invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandDescriptor {
    pub tool_name: String,
    pub reference_genome: Option<String>,
    pub input_files: Vec<String>,
    pub output_file: Option<String>,
    pub parameters: Vec<CommandParameter>,
}

impl CommandDescriptor {
    /// Starts building a descriptor for the given tool
    pub fn builder(tool_name: impl Into<String>) -> CommandBuilder {
        CommandBuilder {
            descriptor: CommandDescriptor {
                tool_name: tool_name.into(),
                reference_genome: None,
                input_files: Vec::new(),
                output_file: None,
                parameters: Vec::new(),
            },
        }
    }

    /// Renders `<tool> [-R ref] [-I input]* [-O output] <param>*`
    ///
    /// Environment parameters are skipped; all others keep caller order.
    pub fn command_line(&self) -> String {
        let mut command = self.tool_name.clone();

        if let Some(reference) = &self.reference_genome {
            command.push_str(" -R ");
            command.push_str(reference);
        }

        for input in &self.input_files {
            command.push_str(" -I ");
            command.push_str(input);
        }

        if let Some(output) = &self.output_file {
            command.push_str(" -O ");
            command.push_str(output);
        }

        for param in self.parameters.iter().filter(|p| !p.environment_variable) {
            command.push(' ');
            command.push_str(&param.render());
        }

        command
    }

    /// Environment bindings in parameter order
    pub fn environment(&self) -> Vec<(String, String)> {
        self.parameters
            .iter()
            .filter(|p| p.environment_variable)
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect()
    }
}

/// Consuming builder for [`CommandDescriptor`]
///
/// Building never fails; empty strings for reference or output are treated
/// as absent.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    descriptor: CommandDescriptor,
}

impl CommandBuilder {
    pub fn reference(mut self, reference: impl Into<String>) -> Self {
        let reference = reference.into();
        self.descriptor.reference_genome = (!reference.is_empty()).then_some(reference);
        self
    }

    pub fn input(mut self, input: impl Into<String>) -> Self {
        self.descriptor.input_files.push(input.into());
        self
    }

    pub fn inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.descriptor
            .input_files
            .extend(inputs.into_iter().map(Into::into));
        self
    }

    pub fn output(mut self, output: impl Into<String>) -> Self {
        let output = output.into();
        self.descriptor.output_file = (!output.is_empty()).then_some(output);
        self
    }

    pub fn parameter(mut self, parameter: CommandParameter) -> Self {
        self.descriptor.parameters.push(parameter);
        self
    }

    pub fn parameters(mut self, parameters: impl IntoIterator<Item = CommandParameter>) -> Self {
        self.descriptor.parameters.extend(parameters);
        self
    }

    pub fn build(self) -> CommandDescriptor {
        self.descriptor
    }
}

/// Why an invocation did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// The tool ran and exited nonzero
    Stage,
    /// The wall-clock budget expired and the process was killed
    Timeout,
    /// The subprocess could not be spawned or its streams could not be read
    Transport,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Stage => write!(f, "stage failure"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Transport => write!(f, "transport failure"),
        }
    }
}

/// Outcome of exactly one invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    /// `None` when the process never produced an exit status
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub error_message: Option<String>,
    pub failure: Option<FailureKind>,
    #[serde(rename = "elapsed_ms", with = "duration_ms")]
    pub elapsed: Duration,
    pub command: CommandDescriptor,
}

impl CommandResult {
    /// Result for a process that ran to completion
    ///
    /// Success is decided solely by a zero exit code.
    pub fn completed(
        command: CommandDescriptor,
        exit_code: Option<i32>,
        stdout: String,
        stderr: String,
        elapsed: Duration,
    ) -> Self {
        let success = exit_code == Some(0);
        let error_message = (!success).then(|| {
            let trimmed = stderr.trim();
            if !trimmed.is_empty() {
                trimmed.to_string()
            } else {
                match exit_code {
                    Some(code) => format!("{} exited with status {}", command.tool_name, code),
                    None => format!("{} was terminated by a signal", command.tool_name),
                }
            }
        });

        Self {
            success,
            exit_code,
            stdout,
            stderr,
            error_message,
            failure: (!success).then_some(FailureKind::Stage),
            elapsed,
            command,
        }
    }

    /// Result for a process killed after exceeding `limit`
    pub fn timed_out(
        command: CommandDescriptor,
        limit: Duration,
        stdout: String,
        stderr: String,
        elapsed: Duration,
    ) -> Self {
        Self {
            success: false,
            exit_code: None,
            stdout,
            stderr,
            error_message: Some(format!(
                "Command execution timed out after {}",
                describe_limit(limit)
            )),
            failure: Some(FailureKind::Timeout),
            elapsed,
            command,
        }
    }

    /// Result for a spawn or stream I/O failure
    pub fn transport_failure(
        command: CommandDescriptor,
        error: impl std::fmt::Display,
        stdout: String,
        stderr: String,
        elapsed: Duration,
    ) -> Self {
        Self {
            success: false,
            exit_code: None,
            stdout,
            stderr,
            error_message: Some(format!("Error executing command: {}", error)),
            failure: Some(FailureKind::Transport),
            elapsed,
            command,
        }
    }

    /// Error text, or an empty string for successful results
    pub fn error_text(&self) -> &str {
        self.error_message.as_deref().unwrap_or("")
    }
}

fn describe_limit(limit: Duration) -> String {
    let secs = limit.as_secs();
    if secs >= 60 && secs % 60 == 0 {
        format!("{} minutes", secs / 60)
    } else if secs >= 1 {
        format!("{} seconds", secs)
    } else {
        format!("{} ms", limit.as_millis())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
