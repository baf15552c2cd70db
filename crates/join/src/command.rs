//! Typed description of an agent join invocation.

use url::Url;

/// Everything needed to install-and-start an agent against a server.
///
/// The credential is handed to the installer as process environment
/// (`K3S_URL`/`K3S_TOKEN`), never interpolated into a shell string, and
/// is redacted from the `Debug` form so it cannot leak into logs.
#[derive(Clone)]
pub struct K3sJoinCommand {
    server_url: Url,
    token: String,
    node_name: Option<String>,
    version: Option<String>,
    extra_args: Vec<String>,
}

impl K3sJoinCommand {
    /// Creates a join command for the given server and credential.
    pub fn new(server_url: Url, token: impl Into<String>) -> Self {
        Self {
            server_url,
            token: token.into(),
            node_name: None,
            version: None,
            extra_args: Vec::new(),
        }
    }

    /// Sets an explicit agent node name.
    #[must_use]
    pub fn with_node_name(mut self, name: impl Into<String>) -> Self {
        self.node_name = Some(name.into());
        self
    }

    /// Pins the version the installer should fetch.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Appends an extra argument for the agent process.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// The server this command joins.
    #[must_use]
    pub const fn server_url(&self) -> &Url {
        &self.server_url
    }

    /// Applies the command to an installer process: credential and
    /// server as environment, everything else as arguments.
    pub fn apply_to(&self, cmd: &mut tokio::process::Command) {
        cmd.env("K3S_URL", self.server_url.as_str());
        cmd.env("K3S_TOKEN", &self.token);
        if let Some(version) = &self.version {
            cmd.env("INSTALL_K3S_VERSION", version);
        }
        if let Some(name) = &self.node_name {
            cmd.arg("--node-name").arg(name);
        }
        for arg in &self.extra_args {
            cmd.arg(arg);
        }
    }
}

impl std::fmt::Debug for K3sJoinCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("K3sJoinCommand")
            .field("server_url", &self.server_url.as_str())
            .field("token", &"<redacted>")
            .field("node_name", &self.node_name)
            .field("version", &self.version)
            .field("extra_args", &self.extra_args)
            .finish()
    }
}
