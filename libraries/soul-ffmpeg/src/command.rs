//! Engine command lines
//!
//! An [`EngineCommand`] is an ordered argument vector plus a dry/live flag.
//! Commands are built fresh for every invocation and never persisted.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Path, PathBuf};

/// Path of the platform null sink
pub fn null_device() -> &'static Path {
    if cfg!(windows) {
        Path::new("NUL")
    } else {
        Path::new("/dev/null")
    }
}

/// Check whether a path names the platform null sink
pub fn is_null_device(path: &Path) -> bool {
    path == null_device()
}

/// A single engine invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    program: PathBuf,
    args: Vec<OsString>,
    dry: bool,
}

impl EngineCommand {
    /// Create a live command for the given executable
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            dry: false,
        }
    }

    /// Mark the command as dry: runners log it instead of spawning it
    pub fn dry(mut self, dry: bool) -> Self {
        self.dry = dry;
        self
    }

    /// Append one argument
    pub fn arg(&mut self, arg: impl AsRef<OsStr>) -> &mut Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        for arg in args {
            self.arg(arg);
        }
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    pub fn is_dry(&self) -> bool {
        self.dry
    }

    /// Arguments as lossy UTF-8 strings, mostly useful for inspection in tests
    pub fn args_lossy(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    /// Last argument, which for every engine command is the output target
    pub fn output_target(&self) -> Option<&OsStr> {
        self.args.last().map(OsString::as_os_str)
    }

    /// Shell-quoted command line for logs and error messages
    pub fn to_shell_string(&self) -> String {
        let program = self.program.to_string_lossy().into_owned();
        let words: Vec<String> = std::iter::once(program)
            .chain(self.args_lossy())
            .collect();
        shlex::try_join(words.iter().map(String::as_str)).unwrap_or_else(|_| words.join(" "))
    }
}

impl fmt::Display for EngineCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_shell_string())
    }
}
