//! # Launch parameters.
//!
//! [`LaunchSpec`] is what a service's runner factory produces: the command line
//! plus everything a container backend would need (image, mounts, namespaces).
//! The host [`ProcessRunner`](crate::ProcessRunner) only understands the
//! process half and rejects the rest.
//!
//! ```rust
//! use nodevisor::{Args, LaunchSpec};
//!
//! let flags = Args::new().with("config", "/etc/timed.yaml");
//! let spec = LaunchSpec::new("timed")
//!     .arg("/usr/bin/timed")
//!     .flags(&flags)
//!     .env("GODEBUG", "netdns=go");
//!
//! assert_eq!(spec.args, vec!["/usr/bin/timed", "--config=/etc/timed.yaml"]);
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::args::Args;

/// A bind mount for container backends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mount {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub read_only: bool,
}

/// Namespaces to isolate the instance in. `false` means "share the host's".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Namespaces {
    pub network: bool,
    pub pid: bool,
    pub ipc: bool,
    pub uts: bool,
    pub mount: bool,
}

impl Namespaces {
    /// `true` if any namespace is isolated.
    pub fn any(&self) -> bool {
        self.network || self.pid || self.ipc || self.uts || self.mount
    }
}

/// Everything needed to launch one instance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Service identifier.
    pub id: String,
    /// Program followed by its arguments.
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub cwd: Option<PathBuf>,
    /// Container image reference.
    pub image: Option<String>,
    pub mounts: Vec<Mount>,
    pub namespaces: Namespaces,
}

impl LaunchSpec {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Appends `--key=value` flags in key order.
    pub fn flags(mut self, flags: &Args) -> Self {
        self.args.extend(flags.to_flags());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn mount(mut self, mount: Mount) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn namespaces(mut self, namespaces: Namespaces) -> Self {
        self.namespaces = namespaces;
        self
    }
}
