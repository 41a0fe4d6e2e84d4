//! Confirmation Mail Delivery
//!
//! SMTP transport built once at startup from an ordered list of relay
//! profiles. The first profile whose connection test succeeds becomes the
//! active transport; if none does, confirmation emails are disabled for the
//! life of the process. Relays are never re-probed per request.
//!
//! [`NotificationDispatcher`] is what the submission service calls. It never
//! returns an error: every outcome is logged, counted and handed back for
//! the caller to ignore.

use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use intake_core::{Notification, NotificationError, Notifier};
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use crate::telemetry::metrics;

/// Upper bound on one inline delivery, covering every SMTP round trip.
pub const DEFAULT_INLINE_DEADLINE: Duration = Duration::from_secs(15);

/// Relays tried when `INTAKE_MAIL_RELAYS` is not set.
pub const DEFAULT_RELAYS: &str = "smtp.gmail.com:465:tls,smtp.gmail.com:587:starttls";

// ============================================================================
// RELAY PROFILES
// ============================================================================

/// How the SMTP session is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    /// Implicit TLS (SMTPS, usually port 465)
    Tls,
    /// STARTTLS upgrade (usually port 587)
    StartTls,
    /// No encryption. Local relays and test servers only.
    Plain,
}

/// One candidate relay: `host:port:mode`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpProfile {
    pub host: String,
    pub port: u16,
    pub security: SmtpSecurity,
}

impl FromStr for SmtpProfile {
    type Err = NotificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| NotificationError::Build {
            reason: format!("invalid relay '{}': {}", s, reason),
        };

        let mut parts = s.trim().split(':');
        let host = parts
            .next()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing host"))?;
        let port = parts
            .next()
            .ok_or_else(|| invalid("missing port"))?
            .trim()
            .parse::<u16>()
            .map_err(|_| invalid("port is not a number"))?;
        let security = match parts.next().map(|m| m.trim().to_lowercase()).as_deref() {
            Some("tls") | Some("smtps") => SmtpSecurity::Tls,
            Some("starttls") => SmtpSecurity::StartTls,
            Some("plain") | Some("none") => SmtpSecurity::Plain,
            None if port == 465 => SmtpSecurity::Tls,
            None => SmtpSecurity::StartTls,
            Some(_) => return Err(invalid("mode must be tls, starttls or plain")),
        };
        if parts.next().is_some() {
            return Err(invalid("too many ':' separated parts"));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            security,
        })
    }
}

impl std::fmt::Display for SmtpProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Parse a comma-separated relay list, skipping (and logging) bad entries.
pub fn parse_relays(raw: &str) -> Vec<SmtpProfile> {
    raw.split(',')
        .filter(|entry| !entry.trim().is_empty())
        .filter_map(|entry| match entry.parse::<SmtpProfile>() {
            Ok(profile) => Some(profile),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring mail relay entry");
                None
            }
        })
        .collect()
}

// ============================================================================
// MAIL CONFIGURATION
// ============================================================================

/// When the confirmation email is sent relative to the HTTP response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Spawned onto the runtime; the response does not wait for SMTP.
    Background,
    /// Awaited before the response is written.
    Inline,
}

/// Mail configuration from environment variables.
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// SMTP login, also used as the sender address
    pub user: Option<String>,
    /// SMTP password
    pub password: Option<SecretString>,
    /// Display name in the From header
    pub from_name: String,
    /// Relays in preference order
    pub relays: Vec<SmtpProfile>,
    pub delivery: DeliveryMode,
    /// Connect and command timeout per relay
    pub timeout: Duration,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            user: None,
            password: None,
            from_name: "Application Team".to_string(),
            relays: parse_relays(DEFAULT_RELAYS),
            delivery: DeliveryMode::Background,
            timeout: Duration::from_secs(10),
        }
    }
}

impl MailConfig {
    /// Create MailConfig from environment variables.
    ///
    /// Environment variables:
    /// - `INTAKE_MAIL_USER`, `INTAKE_MAIL_PASSWORD`: SMTP credentials (both
    ///   required, otherwise mail is disabled)
    /// - `INTAKE_MAIL_FROM_NAME`: Sender display name (default: "Application Team")
    /// - `INTAKE_MAIL_RELAYS`: Ordered `host:port:mode` list
    /// - `INTAKE_MAIL_DELIVERY`: "background" or "inline" (default: background)
    /// - `INTAKE_MAIL_TIMEOUT_SECS`: Per-relay timeout (default: 10)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

        Self {
            user: non_empty("INTAKE_MAIL_USER").map(|u| u.trim().to_string()),
            password: non_empty("INTAKE_MAIL_PASSWORD").map(SecretString::from),
            from_name: non_empty("INTAKE_MAIL_FROM_NAME").unwrap_or(defaults.from_name),
            relays: non_empty("INTAKE_MAIL_RELAYS")
                .map(|raw| parse_relays(&raw))
                .unwrap_or(defaults.relays),
            delivery: match non_empty("INTAKE_MAIL_DELIVERY")
                .map(|m| m.trim().to_lowercase())
                .as_deref()
            {
                Some("inline") => DeliveryMode::Inline,
                _ => DeliveryMode::Background,
            },
            timeout: non_empty("INTAKE_MAIL_TIMEOUT_SECS")
                .and_then(|s| s.trim().parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Both credentials are present.
    pub fn is_configured(&self) -> bool {
        self.user.is_some() && self.password.is_some()
    }
}

// ============================================================================
// SMTP NOTIFIER
// ============================================================================

/// Lettre-backed [`Notifier`].
#[derive(Clone)]
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    relay: String,
}

impl SmtpNotifier {
    /// Build (without connecting) a transport for one relay profile.
    pub fn build(
        profile: &SmtpProfile,
        from: Mailbox,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        let builder = match profile.security {
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&profile.host),
            SmtpSecurity::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&profile.host)
            }
            SmtpSecurity::Plain => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(
                &profile.host,
            )),
        }
        .map_err(|e| NotificationError::Build {
            reason: format!("relay {}: {}", profile, e),
        })?;

        let transport = builder
            .port(profile.port)
            .credentials(credentials)
            .timeout(Some(timeout))
            .build();

        Ok(Self {
            transport,
            from,
            relay: profile.to_string(),
        })
    }

    /// Open a session, run NOOP, and close it.
    pub async fn probe(&self) -> bool {
        match self.transport.test_connection().await {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!(relay = %self.relay, "Mail relay refused the connection test");
                false
            }
            Err(e) => {
                tracing::warn!(relay = %self.relay, error = %e, "Mail relay unreachable");
                false
            }
        }
    }

    fn message(&self, notification: &Notification) -> Result<Message, NotificationError> {
        let to = notification.recipient().ok_or(NotificationError::NoRecipient)?;
        let to: Mailbox = to.parse().map_err(|e: lettre::address::AddressError| {
            NotificationError::InvalidAddress {
                address: to.to_string(),
                reason: e.to_string(),
            }
        })?;

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(notification.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(notification.body.clone())
            .map_err(|e| NotificationError::Build {
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        let message = self.message(notification)?;
        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| NotificationError::Transport {
                reason: e.to_string(),
            })
    }

    fn name(&self) -> &str {
        &self.relay
    }
}

/// Run `probe` over `candidates` in order and keep the first that passes.
pub async fn select_first<T, F, Fut>(candidates: Vec<T>, mut probe: F) -> Option<T>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for candidate in candidates {
        if let Some(accepted) = probe(candidate).await {
            return Some(accepted);
        }
    }
    None
}

/// Build the process-wide mail transport.
///
/// Returns `None` (mail disabled) when credentials are missing, the sender
/// address is invalid, or no relay passes its connection test.
pub async fn connect_notifier(config: &MailConfig) -> Option<Arc<dyn Notifier>> {
    let (Some(user), Some(password)) = (&config.user, &config.password) else {
        tracing::info!("Mail credentials not configured; confirmation emails disabled");
        return None;
    };

    let address = match user.parse::<Address>() {
        Ok(address) => address,
        Err(e) => {
            tracing::error!(user = %user, error = %e, "Mail user is not a valid sender address");
            return None;
        }
    };
    let from = Mailbox::new(Some(config.from_name.clone()), address);
    let credentials = Credentials::new(user.clone(), password.expose_secret().to_string());

    let candidates: Vec<SmtpNotifier> = config
        .relays
        .iter()
        .filter_map(|profile| {
            SmtpNotifier::build(profile, from.clone(), credentials.clone(), config.timeout)
                .map_err(|e| tracing::warn!(error = %e, "Skipping mail relay"))
                .ok()
        })
        .collect();

    let selected = select_first(candidates, |notifier| async move {
        if notifier.probe().await {
            Some(notifier)
        } else {
            None
        }
    })
    .await;

    match selected {
        Some(notifier) => {
            tracing::info!(relay = %notifier.relay, "Mail transport ready");
            Some(Arc::new(notifier))
        }
        None => {
            tracing::error!(
                relays = config.relays.len(),
                "No mail relay reachable; confirmation emails disabled"
            );
            None
        }
    }
}

// ============================================================================
// DISPATCH
// ============================================================================

/// What happened to one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    Sent,
    /// No transport or no recipient; nothing attempted.
    Skipped,
    Failed,
    /// Handed to a background task.
    Queued,
}

impl NotificationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::Queued => "queued",
        }
    }
}

/// Best-effort delivery front for the submission service.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Option<Arc<dyn Notifier>>,
    mode: DeliveryMode,
    inline_deadline: Duration,
}

impl NotificationDispatcher {
    pub fn new(notifier: Option<Arc<dyn Notifier>>, mode: DeliveryMode) -> Self {
        Self {
            notifier,
            mode,
            inline_deadline: DEFAULT_INLINE_DEADLINE,
        }
    }

    /// Cap the whole of an inline delivery. Must stay below the request
    /// timeout so a slow relay cannot turn a committed submission into a 408.
    pub fn with_inline_deadline(mut self, deadline: Duration) -> Self {
        self.inline_deadline = deadline;
        self
    }

    /// A dispatcher that skips everything.
    pub fn disabled() -> Self {
        Self::new(None, DeliveryMode::Inline)
    }

    pub fn is_enabled(&self) -> bool {
        self.notifier.is_some()
    }

    /// Send or queue `notification`. Never fails.
    pub async fn dispatch(&self, notification: Notification) -> NotificationOutcome {
        let delivery_id = Uuid::now_v7();

        let Some(notifier) = self.notifier.clone() else {
            tracing::debug!(%delivery_id, "Mail transport not configured; skipping");
            return record(NotificationOutcome::Skipped);
        };
        if notification.recipient().is_none() {
            tracing::warn!(%delivery_id, "Notification has no recipient; skipping");
            return record(NotificationOutcome::Skipped);
        }

        match self.mode {
            DeliveryMode::Inline => {
                let relay = notifier.name().to_string();
                match tokio::time::timeout(
                    self.inline_deadline,
                    deliver(notifier, notification, delivery_id),
                )
                .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        tracing::error!(
                            %delivery_id,
                            relay = %relay,
                            deadline_ms = self.inline_deadline.as_millis() as u64,
                            "Confirmation email timed out"
                        );
                        record(NotificationOutcome::Failed)
                    }
                }
            }
            DeliveryMode::Background => {
                tokio::spawn(deliver(notifier, notification, delivery_id));
                NotificationOutcome::Queued
            }
        }
    }
}

async fn deliver(
    notifier: Arc<dyn Notifier>,
    notification: Notification,
    delivery_id: Uuid,
) -> NotificationOutcome {
    let outcome = match notifier.send(&notification).await {
        Ok(()) => {
            tracing::info!(%delivery_id, relay = notifier.name(), "Confirmation email sent");
            NotificationOutcome::Sent
        }
        Err(e) => {
            tracing::error!(
                %delivery_id,
                relay = notifier.name(),
                error = %e,
                "Confirmation email failed"
            );
            NotificationOutcome::Failed
        }
    };
    record(outcome)
}

fn record(outcome: NotificationOutcome) -> NotificationOutcome {
    if let Some(metrics) = metrics() {
        metrics.record_notification(outcome.as_str());
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct StubNotifier {
        fail: bool,
        sent: Mutex<Vec<Notification>>,
    }

    #[async_trait]
    impl Notifier for StubNotifier {
        async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
            if self.fail {
                return Err(NotificationError::Transport {
                    reason: "connection refused".to_string(),
                });
            }
            self.sent
                .lock()
                .map_err(|_| NotificationError::Transport {
                    reason: "poisoned".to_string(),
                })?
                .push(notification.clone());
            Ok(())
        }

        fn name(&self) -> &str {
            "stub"
        }
    }

    fn stub(fail: bool) -> Arc<StubNotifier> {
        Arc::new(StubNotifier {
            fail,
            sent: Mutex::new(Vec::new()),
        })
    }

    fn note(to: Option<&str>) -> Notification {
        Notification::new(to.map(str::to_string), "Subject", "Body")
    }

    #[test]
    fn test_profile_parse() -> Result<(), NotificationError> {
        let p: SmtpProfile = "smtp.gmail.com:465:tls".parse()?;
        assert_eq!(p.host, "smtp.gmail.com");
        assert_eq!(p.port, 465);
        assert_eq!(p.security, SmtpSecurity::Tls);

        let p: SmtpProfile = " localhost:2525:plain ".parse()?;
        assert_eq!(p.security, SmtpSecurity::Plain);

        let p: SmtpProfile = "mail.example.com:587".parse()?;
        assert_eq!(p.security, SmtpSecurity::StartTls);
        Ok(())
    }

    #[test]
    fn test_profile_parse_rejects_garbage() {
        assert!("".parse::<SmtpProfile>().is_err());
        assert!("host".parse::<SmtpProfile>().is_err());
        assert!("host:abc:tls".parse::<SmtpProfile>().is_err());
        assert!("host:25:ssl3".parse::<SmtpProfile>().is_err());
        assert!("host:25:tls:extra".parse::<SmtpProfile>().is_err());
    }

    #[test]
    fn test_default_relays_in_order() {
        let relays = parse_relays(DEFAULT_RELAYS);
        assert_eq!(relays.len(), 2);
        assert_eq!(relays[0].port, 465);
        assert_eq!(relays[1].security, SmtpSecurity::StartTls);
    }

    #[test]
    fn test_parse_relays_skips_bad_entries() {
        let relays = parse_relays("bad, a.example.com:465:tls ,,b.example.com:nope");
        assert_eq!(relays.len(), 1);
        assert_eq!(relays[0].host, "a.example.com");
    }

    #[test]
    fn test_config_requires_both_credentials() {
        let mut config = MailConfig {
            user: Some("team@example.com".to_string()),
            ..Default::default()
        };
        assert!(!config.is_configured());
        config.password = Some(SecretString::from("app-password"));
        assert!(config.is_configured());
    }

    #[tokio::test]
    async fn test_select_first_takes_first_passing_in_order() {
        let tried = Arc::new(Mutex::new(Vec::new()));
        let log = tried.clone();
        let chosen = select_first(vec![1, 2, 3, 4], move |n| {
            let log = log.clone();
            async move {
                if let Ok(mut tried) = log.lock() {
                    tried.push(n);
                }
                (n >= 2).then_some(n)
            }
        })
        .await;

        assert_eq!(chosen, Some(2));
        let tried = tried.lock().map(|t| t.clone()).unwrap_or_default();
        assert_eq!(tried, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_select_first_none_when_all_fail() {
        let chosen = select_first(vec![1, 2], |_| async { None::<i32> }).await;
        assert_eq!(chosen, None);
    }

    #[tokio::test]
    async fn test_connect_without_credentials_is_disabled() {
        assert!(connect_notifier(&MailConfig::default()).await.is_none());
    }

    #[tokio::test]
    async fn test_dispatch_without_transport_skips() {
        let dispatcher = NotificationDispatcher::disabled();
        assert!(!dispatcher.is_enabled());
        assert_eq!(
            dispatcher.dispatch(note(Some("a@example.com"))).await,
            NotificationOutcome::Skipped
        );
    }

    #[tokio::test]
    async fn test_dispatch_without_recipient_skips() {
        let notifier = stub(false);
        let dispatcher = NotificationDispatcher::new(Some(notifier.clone()), DeliveryMode::Inline);
        assert_eq!(dispatcher.dispatch(note(None)).await, NotificationOutcome::Skipped);
        assert_eq!(dispatcher.dispatch(note(Some("  "))).await, NotificationOutcome::Skipped);
        assert!(notifier.sent.lock().map(|s| s.is_empty()).unwrap_or(false));
    }

    #[tokio::test]
    async fn test_inline_dispatch_reports_outcome() {
        let ok = NotificationDispatcher::new(Some(stub(false)), DeliveryMode::Inline);
        assert_eq!(
            ok.dispatch(note(Some("a@example.com"))).await,
            NotificationOutcome::Sent
        );

        let failing = NotificationDispatcher::new(Some(stub(true)), DeliveryMode::Inline);
        assert_eq!(
            failing.dispatch(note(Some("a@example.com"))).await,
            NotificationOutcome::Failed
        );
    }

    #[tokio::test]
    async fn test_background_dispatch_queues_and_delivers() {
        let notifier = stub(false);
        let dispatcher =
            NotificationDispatcher::new(Some(notifier.clone()), DeliveryMode::Background);
        assert_eq!(
            dispatcher.dispatch(note(Some("a@example.com"))).await,
            NotificationOutcome::Queued
        );

        for _ in 0..50 {
            if notifier.sent.lock().map(|s| s.len()).unwrap_or(0) == 1 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("background delivery did not run");
    }

    #[tokio::test]
    async fn test_inline_dispatch_gives_up_at_deadline() {
        struct StalledNotifier;

        #[async_trait]
        impl Notifier for StalledNotifier {
            async fn send(&self, _: &Notification) -> Result<(), NotificationError> {
                std::future::pending().await
            }

            fn name(&self) -> &str {
                "stalled"
            }
        }

        let notifier: Arc<dyn Notifier> = Arc::new(StalledNotifier);
        let dispatcher = NotificationDispatcher::new(Some(notifier), DeliveryMode::Inline)
            .with_inline_deadline(Duration::from_millis(50));
        let started = std::time::Instant::now();
        assert_eq!(
            dispatcher.dispatch(note(Some("a@example.com"))).await,
            NotificationOutcome::Failed
        );
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    // Building a lettre transport starts its connection pool, which needs a runtime.
    #[tokio::test]
    async fn test_message_rejects_invalid_address() -> Result<(), Box<dyn std::error::Error>> {
        let profile: SmtpProfile = "localhost:2525:plain".parse()?;
        let from = Mailbox::new(Some("Application Team".to_string()), "team@example.com".parse()?);
        let notifier = SmtpNotifier::build(
            &profile,
            from,
            Credentials::new("team@example.com".to_string(), "pw".to_string()),
            Duration::from_secs(1),
        )?;

        let err = notifier.message(&note(Some("not an address"))).err();
        assert!(matches!(err, Some(NotificationError::InvalidAddress { .. })));

        let message = notifier.message(&note(Some("applicant@example.com")))?;
        let raw = String::from_utf8(message.formatted())?;
        assert!(raw.contains("Subject: Subject"));
        assert!(raw.contains("Application Team"));
        assert!(raw.contains("<team@example.com>"));
        Ok(())
    }
}
