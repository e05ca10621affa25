//! Command builder for `forge script`.

/// Builder for `forge script` arguments.
#[derive(Debug, Clone)]
pub struct ForgeScriptCmdBuilder {
    target: String,
    rpc_url: Option<String>,
    broadcast: bool,
    verify: bool,
    legacy: bool,
    verbosity: u8,
    extra_args: Vec<String>,
}

impl ForgeScriptCmdBuilder {
    /// Create a builder for a script target such as `script/Foo.s.sol:DeployScript`.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            rpc_url: None,
            broadcast: false,
            verify: false,
            legacy: false,
            verbosity: 0,
            extra_args: Vec::new(),
        }
    }

    /// Set the RPC endpoint.
    pub fn rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = Some(url.into());
        self
    }

    /// Send the transactions instead of only simulating them.
    pub fn broadcast(mut self, broadcast: bool) -> Self {
        self.broadcast = broadcast;
        self
    }

    /// Verify the deployed contracts on the block explorer.
    pub fn verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Use pre-EIP-1559 transactions.
    pub fn legacy(mut self, legacy: bool) -> Self {
        self.legacy = legacy;
        self
    }

    /// Set the number of `v`s in the verbosity flag. Zero omits the flag.
    pub fn verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Add extra arguments.
    pub fn extra_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.extra_args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    /// Build the command as a vector of strings.
    pub fn build(self) -> Vec<String> {
        let mut cmd = vec!["script".to_string(), self.target];

        if let Some(rpc_url) = self.rpc_url {
            cmd.push("--rpc-url".to_string());
            cmd.push(rpc_url);
        }

        if self.broadcast {
            cmd.push("--broadcast".to_string());
        }

        if self.verify {
            cmd.push("--verify".to_string());
        }

        if self.legacy {
            cmd.push("--legacy".to_string());
        }

        if self.verbosity > 0 {
            cmd.push(format!("-{}", "v".repeat(self.verbosity as usize)));
        }

        cmd.extend(self.extra_args);

        cmd
    }
}
