//! Capture session state machine and the fallback ladder
//!
//! A session owns one tab from creation to close:
//! `Created -> Configuring -> Navigating -> Extracting -> Finalizing -> Closed`.
//! Any failure moves it to `Failed`, and every path goes through
//! `Finalizing`, which stops the background listeners and closes the tab
//! (left open only in debug mode).

use super::configurator::configure;
use super::error::{CaptureError, CaptureFailure};
use super::extraction::{extract, ServiceContext};
use super::interception::ConsoleCollector;
use super::navigation::resolve_context;
use super::options::CaptureOptions;
use super::page_data::PageData;
use super::readiness::ReadinessLadder;
use super::scripts::ScriptBundle;
use crate::cdp::{Target, Transport};
use crate::state::SessionState;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// One configure, navigate, extract and close run for a single URL
pub struct CaptureSession {
    transport: Arc<dyn Transport>,
    services: ServiceContext,
    state: SessionState,
}

impl CaptureSession {
    pub fn new(transport: Arc<dyn Transport>, services: ServiceContext) -> Self {
        Self {
            transport,
            services,
            state: SessionState::Created,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) -> Result<(), CaptureError> {
        if !self.state.can_transition_to(next) {
            return Err(CaptureError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::trace!("Session {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Runs the session to completion
    ///
    /// Consumes the session: a tab is used for exactly one capture.
    pub async fn run(
        mut self,
        options: &CaptureOptions,
        ladder: &ReadinessLadder,
    ) -> Result<PageData, CaptureFailure> {
        let target = match Target::open(Arc::clone(&self.transport)).await {
            Ok(target) => target,
            Err(source) => {
                self.finalize_without_target();
                return Err(CaptureError::Setup {
                    step: "target creation",
                    source,
                }
                .into());
            }
        };

        let cancel = CancellationToken::new();
        // Stops the listeners even if this future is dropped midway
        let _listeners = cancel.clone().drop_guard();
        let console = ConsoleCollector::spawn(&target.handle(), cancel.child_token());

        let outcome = self.drive(&target, options, ladder, &cancel).await;
        if outcome.is_err() {
            let _ = self.transition(SessionState::Failed);
        }

        let _ = self.transition(SessionState::Finalizing);
        cancel.cancel();
        let console_messages = console.stop().await;
        if options.debug {
            target.detach();
        } else {
            target.close().await;
        }
        let _ = self.transition(SessionState::Closed);

        match outcome {
            Ok(mut data) => {
                if data.console_messages.is_empty() {
                    data.console_messages = console_messages;
                }
                Ok(data)
            }
            Err(error) => {
                tracing::debug!("Capture of {} failed: {}", options.url, error);
                Err(CaptureFailure {
                    error,
                    console_messages,
                })
            }
        }
    }

    fn finalize_without_target(&mut self) {
        let _ = self.transition(SessionState::Failed);
        let _ = self.transition(SessionState::Finalizing);
        let _ = self.transition(SessionState::Closed);
    }

    async fn drive(
        &mut self,
        target: &Target,
        options: &CaptureOptions,
        ladder: &ReadinessLadder,
        cancel: &CancellationToken,
    ) -> Result<PageData, CaptureError> {
        self.transition(SessionState::Configuring)?;
        let scripts = ScriptBundle::load(options).await?;
        let interceptor = configure(target, options, &scripts, cancel).await?;

        self.transition(SessionState::Navigating)?;
        let resolved = resolve_context(target, options, ladder).await;
        // A stalled interceptor shows up as a load timeout; report the cause
        if let Some(interceptor) = &interceptor {
            interceptor.check()?;
        }
        let context_id = resolved?;

        self.transition(SessionState::Extracting)?;
        let extraction = extract(target, context_id, options, &self.services);
        let mut data = match options.capture_timeout() {
            Some(limit) => tokio::time::timeout(limit, extraction)
                .await
                .map_err(|_| CaptureError::CaptureTimeout { timeout: limit })??,
            None => extraction.await?,
        };

        if let Some(interceptor) = interceptor {
            if data.http_info.is_none() {
                data.http_info = interceptor.http_info();
            }
            interceptor.stop().await;
        }

        Ok(data)
    }
}

/// Captures one page, retrying with weaker readiness conditions on load timeout
///
/// Each retry is a fresh session with a new tab. Only load timeouts are
/// retried, and only while the ladder has a weaker step, so this makes at
/// most `ladder.len() - 1` retries.
pub async fn capture_page(
    transport: Arc<dyn Transport>,
    options: &CaptureOptions,
    services: &ServiceContext,
) -> Result<PageData, CaptureFailure> {
    let ladder = ReadinessLadder::new(options.readiness_ladder.iter().cloned());
    let mut options = options.clone();

    loop {
        let session = CaptureSession::new(Arc::clone(&transport), services.clone());
        match session.run(&options, &ladder).await {
            Err(failure) if failure.error.is_load_timeout() && options.wait_until_fallback => {
                match ladder.fallback(&options.wait_until) {
                    Some(next) => {
                        tracing::info!(
                            "Load timeout for {} waiting for {}, retrying with {}",
                            options.url,
                            options.wait_until,
                            next
                        );
                        options.wait_until = next.to_string();
                    }
                    None => return Err(failure),
                }
            }
            outcome => return outcome,
        }
    }
}
