//! The synchronous per-snapshot pipeline.
//!
//! `derive → evaluate → edge detection → actions → send`, one snapshot at a
//! time. [`Bridge::process`] takes `&mut self`, so match-state for an
//! identity is never touched by two snapshots at once.

use shift_catalog::{derive_all, Catalog};
use shift_core::{Delivery, SessionTracker, Snapshot, SourceKind};
use shift_link::{BitmapSink, LinkError, ShiftBitmap, TokenMap};
use shift_rules::{AuditLog, Firing, InitialMatch, OnInvalidRule, RuleEngine, RuleLoader, RuleSet};
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::error::Result;
use crate::executor::{unknown_tokens, ActionExecutor, DiagnosticSink, ExecutionReport, TracingDiagnostics};

/// Journal event that ends a commander session.
const SHUTDOWN_EVENT: &str = "Shutdown";

/// What one snapshot did.
#[derive(Debug, Default)]
pub struct ProcessOutcome {
    pub firings: Vec<Firing>,
    pub report: ExecutionReport,
    /// Bitmap after the pass.
    pub bitmap: ShiftBitmap,
    /// The sink accepted a new bitmap.
    pub sent: bool,
    /// The delivery closed its identity's session.
    pub session_ended: bool,
}

impl ProcessOutcome {
    pub fn action_count(&self) -> usize {
        self.firings.iter().map(|f| f.actions.len()).sum()
    }
}

pub struct Bridge {
    catalog: Catalog,
    engine: RuleEngine,
    executor: ActionExecutor,
    sessions: SessionTracker,
    diagnostics: Box<dyn DiagnosticSink + Send>,
    policy: OnInvalidRule,
}

impl Bridge {
    pub fn new(catalog: Catalog, rules: RuleSet, tokens: TokenMap, initial: InitialMatch) -> Self {
        warn_unknown_tokens(&rules, &tokens);
        Self {
            catalog,
            engine: RuleEngine::new(rules, initial),
            executor: ActionExecutor::new(tokens),
            sessions: SessionTracker::new(BridgeConfig::default().session.event_window()),
            diagnostics: Box::new(TracingDiagnostics),
            policy: OnInvalidRule::default(),
        }
    }

    /// Load catalog and rules named by `config`. Any load error is fatal.
    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        let catalog = Catalog::load(&config.rules.catalog)?;
        let loader = RuleLoader::new(config.rules.path.clone());
        let rules = RuleSet::from_parsed(loader.load()?, &catalog, config.rules.on_invalid)?;
        let tokens = config.token_map()?;

        let bridge = Self::new(catalog, rules, tokens, config.rules.initial_match)
            .with_session_tracker(SessionTracker::new(config.session.event_window()))
            .with_policy(config.rules.on_invalid)
            .with_audit_log(AuditLog::with_max_entries(config.rules.audit_max_entries));
        info!(
            signals = bridge.catalog.len(),
            rules = bridge.engine.rules().len(),
            enabled = bridge.engine.rules().enabled().count(),
            "bridge ready"
        );
        Ok(bridge)
    }

    pub fn with_diagnostics(mut self, diagnostics: impl DiagnosticSink + Send + 'static) -> Self {
        self.diagnostics = Box::new(diagnostics);
        self
    }

    pub fn with_session_tracker(mut self, sessions: SessionTracker) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn with_audit_log(mut self, audit: AuditLog) -> Self {
        self.engine = self.engine.with_audit_log(audit);
        self
    }

    /// Policy used by [`reload_from`](Self::reload_from).
    pub fn with_policy(mut self, policy: OnInvalidRule) -> Self {
        self.policy = policy;
        self
    }

    /// Fold a raw delivery into its session and process the merged snapshot.
    /// A journal `Shutdown` ends the session after the pass.
    pub fn deliver(&mut self, delivery: Delivery, sink: &dyn BitmapSink) -> Result<ProcessOutcome> {
        let shutdown = delivery.source == SourceKind::Journal && delivery.event_name() == Some(SHUTDOWN_EVENT);
        let identity = delivery.identity.clone();

        let snapshot = self.sessions.ingest(delivery)?;
        let mut outcome = self.process(&snapshot, sink);

        if shutdown {
            outcome.session_ended = self.end_session(&identity);
        }
        Ok(outcome)
    }

    /// Run one snapshot to completion.
    pub fn process(&mut self, snapshot: &Snapshot, sink: &dyn BitmapSink) -> ProcessOutcome {
        let signals = derive_all(&self.catalog, snapshot);
        let firings = self.engine.evaluate(&signals, snapshot);
        if firings.is_empty() {
            return ProcessOutcome {
                bitmap: self.executor.bitmap(),
                ..ProcessOutcome::default()
            };
        }

        let report = self.executor.apply_all(&firings, self.diagnostics.as_mut());
        let bitmap = self.executor.bitmap();
        let sent = report.changed && transmit(sink, bitmap);

        ProcessOutcome {
            firings,
            report,
            bitmap,
            sent,
            session_ended: false,
        }
    }

    /// Swap in a freshly validated rule set. Match-state survives for rule ids
    /// that are still present and enabled.
    pub fn reload_rules(&mut self, rules: RuleSet) {
        warn_unknown_tokens(&rules, self.executor.tokens());
        self.engine.reload(rules);
    }

    /// Re-read the rules file. On any error the current rule set stays active.
    pub fn reload_from(&mut self, loader: &RuleLoader) -> Result<usize> {
        let parsed = match loader.load() {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(path = %loader.path().display(), error = %e, "rules reload failed, keeping previous rules");
                return Err(e.into());
            }
        };
        let rules = match RuleSet::from_parsed(parsed, &self.catalog, self.policy) {
            Ok(rules) => rules,
            Err(e) => {
                warn!(path = %loader.path().display(), error = %e, "rules reload rejected, keeping previous rules");
                return Err(e.into());
            }
        };
        let count = rules.len();
        self.reload_rules(rules);
        Ok(count)
    }

    /// Drop the identity's accumulated session and match-state.
    pub fn end_session(&mut self, identity: &str) -> bool {
        let had_session = self.sessions.end_session(identity);
        let had_state = self.engine.forget_identity(identity);
        if had_session || had_state {
            info!(identity = %identity, "session ended");
        }
        had_session || had_state
    }

    pub fn bitmap(&self) -> ShiftBitmap {
        self.executor.bitmap()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    pub fn audit_log(&self) -> &AuditLog {
        self.engine.audit_log()
    }
}

fn transmit(sink: &dyn BitmapSink, bitmap: ShiftBitmap) -> bool {
    match sink.send_bitmap(bitmap) {
        Ok(()) => true,
        Err(LinkError::NotConnected) => {
            debug!(bitmap = %bitmap, "link down, bitmap will be resent on reconnect");
            false
        }
        Err(e) => {
            warn!(bitmap = %bitmap, error = %e, "bitmap send failed");
            false
        }
    }
}

fn warn_unknown_tokens(rules: &RuleSet, tokens: &TokenMap) {
    for (rule_id, token) in unknown_tokens(rules, tokens) {
        warn!(rule_id = %rule_id, token = %token, "rule references a token with no bit position");
    }
}
