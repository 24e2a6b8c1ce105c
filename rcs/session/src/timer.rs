use std::time::Duration;

/// Timeouts driving a single session
///
/// Every timer is owned by the future of the phase it guards, reaching a
/// terminal state drops the phase and with it all pending timers.
#[derive(Debug, Clone, Copy)]
pub struct TimerConfig {
    /// How long to wait for a final response to an INVITE
    pub invite_timeout: Duration,

    /// How long the local user may take to answer a received INVITE
    pub ringing_timeout: Duration,

    /// How long to wait for the ACK after accepting a session
    pub ack_timeout: Duration,

    /// How long to wait for the response to a BYE
    pub bye_timeout: Duration,

    /// Terminate established sessions that saw no refresh for this long
    pub session_expires: Option<Duration>,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            invite_timeout: Duration::from_secs(60),
            ringing_timeout: Duration::from_secs(45),
            ack_timeout: Duration::from_secs(10),
            bye_timeout: Duration::from_secs(5),
            session_expires: Some(Duration::from_secs(1800)),
        }
    }
}
