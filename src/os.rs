//! Host operating system helpers
//!
//! Shell invocation and path strings differ between Unix and Windows hosts.
//! The variant is picked once at startup and passed to whatever builds
//! command lines.

use std::process::Command;

/// Host operating system family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingSystem {
    Unix,
    Windows,
}

impl std::fmt::Display for OperatingSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperatingSystem::Unix => write!(f, "Unix"),
            OperatingSystem::Windows => write!(f, "Windows"),
        }
    }
}

impl OperatingSystem {
    /// The OS this binary was built for
    pub fn current() -> Self {
        if cfg!(windows) {
            OperatingSystem::Windows
        } else {
            OperatingSystem::Unix
        }
    }

    /// Shell used to run command lines
    pub fn shell(&self) -> &'static str {
        match self {
            OperatingSystem::Unix => "bash",
            OperatingSystem::Windows => "cmd.exe",
        }
    }

    /// Flag telling the shell to run the next argument
    pub fn option(&self) -> &'static str {
        match self {
            OperatingSystem::Unix => "-c",
            OperatingSystem::Windows => "/c",
        }
    }

    pub fn separator(&self) -> &'static str {
        match self {
            OperatingSystem::Unix => "/",
            OperatingSystem::Windows => "\\",
        }
    }

    /// Extra `docker run` option so containers can reach the host.
    /// Docker Desktop on Windows resolves `host.docker.internal` already.
    pub fn host_option(&self) -> &'static str {
        match self {
            OperatingSystem::Unix => "--add-host=host.docker.internal:host-gateway",
            OperatingSystem::Windows => "",
        }
    }

    /// Build a command that runs `line` through the shell
    pub fn command(&self, line: &str) -> Command {
        let mut cmd = Command::new(self.shell());
        cmd.args([self.option(), line]);
        cmd
    }
}
