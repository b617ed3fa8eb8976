//! # Reporter
//!
//! The multiplexer. Owns one channel to one destination and any number of
//! reporting sessions funnelling into it. The channel opens lazily on the
//! first send and closes when the last session stops; starting a new session
//! afterwards reopens it.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use super::registry::Registry;
use super::session::{ReleaseHandle, ReportingSession};
use super::source::{SourceHooks, StatsSource};
use crate::channels::{build_channel, Channel};
use crate::configs::ReporterOptions;
use crate::destination::{ChannelKind, Destination};
use crate::errors::ReporterError;
use crate::loggers::{LogSink, TracingLogSink};

/// Reports statistics sources to a single destination over one shared channel.
#[derive(Clone)]
pub struct Reporter {
    registry: Arc<Registry>,
}

impl Reporter {
    /// A reporter for `destination` with default options and tracing logs.
    ///
    /// # Errors
    /// `InvalidUrl` or `UnsupportedScheme` for a destination that is not
    /// `ws(s)://` or `http(s)://`. No connection is opened here.
    pub fn new(destination: &str) -> Result<Self, ReporterError> {
        Self::builder(destination).build()
    }

    /// Starts configuring a reporter for `destination`.
    pub fn builder(destination: &str) -> ReporterBuilder {
        ReporterBuilder {
            destination: destination.to_string(),
            options: ReporterOptions::default(),
            channel: None,
            sink: None,
        }
    }

    /// Starts reporting `source` every `frequency`.
    ///
    /// A zero `frequency` reports once, right away, and then stops the session
    /// on its own. The returned handle is the same release signal the source
    /// receives through [`StatsSource::attach`].
    ///
    /// # Errors
    /// `NoRuntime` when called outside a Tokio runtime. Nothing is registered
    /// in that case.
    pub fn start_reporting(
        &self,
        source: Arc<dyn StatsSource>,
        frequency: Duration,
    ) -> Result<ReleaseHandle, ReporterError> {
        let runtime = Handle::try_current().map_err(|_| ReporterError::NoRuntime)?;

        let name: Arc<str> = Arc::from(source.name());
        let (id, release, cancel) = self.registry.register(Arc::clone(&name), frequency);

        source.attach(SourceHooks::new(
            Arc::clone(&name),
            Arc::clone(&self.registry.sink),
            release.clone(),
        ));

        let session = ReportingSession {
            id,
            name,
            source,
            frequency,
            registry: Arc::clone(&self.registry),
            release: release.clone(),
            cancel,
        };
        runtime.spawn(session.run());
        Ok(release)
    }

    /// The normalized destination URL.
    pub fn url(&self) -> &str {
        self.registry.destination.as_str()
    }

    /// Number of sessions currently reporting.
    pub fn reporting_count(&self) -> usize {
        self.registry.active_count()
    }

    /// Transport selected from the destination scheme.
    pub fn channel_kind(&self) -> ChannelKind {
        self.registry.channel.kind()
    }

    /// `true` while the shared channel holds a live connection or request.
    pub fn is_channel_open(&self) -> bool {
        self.registry.channel.is_open()
    }

    /// Resolves once no session is reporting.
    pub async fn wait_idle(&self) {
        let mut count = self.registry.watch_count();
        // The sender lives in the registry we hold, so this cannot fail.
        let _ = count.wait_for(|active| *active == 0).await;
    }

    /// Stops every session; the last stop closes the channel. Waits for the
    /// channel's teardown to finish.
    pub async fn shutdown(&self) {
        for release in self.registry.release_handles() {
            release.release();
        }
        self.registry.channel.closed().await;
    }
}

/// Configures a [`Reporter`] before construction.
pub struct ReporterBuilder {
    destination: String,
    options: ReporterOptions,
    channel: Option<Arc<dyn Channel>>,
    sink: Option<Arc<dyn LogSink>>,
}

impl ReporterBuilder {
    /// Transport timeouts and user agent.
    pub fn options(mut self, options: ReporterOptions) -> Self {
        self.options = options;
        self
    }

    /// Uses `channel` instead of the transport the scheme would select.
    pub fn channel(mut self, channel: Arc<dyn Channel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Receives the reporter's events instead of `tracing`.
    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Validates the destination and builds the reporter.
    pub fn build(self) -> Result<Reporter, ReporterError> {
        let destination = Destination::parse(&self.destination)?;
        let channel = match self.channel {
            Some(channel) => channel,
            None => build_channel(&destination, &self.options)?,
        };
        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingLogSink));
        Ok(Reporter {
            registry: Arc::new(Registry::new(destination, channel, sink)),
        })
    }
}
