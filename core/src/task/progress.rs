/// Byte counters of one exchange, turned into `(sent, received)` fractions.
///
/// Each fraction is `bytes / expected` when the expected size is known, and
/// otherwise 0 until that direction is done and 1 after. Reported values never
/// go backwards.
#[derive(Debug, Default, Clone)]
pub struct ProgressTracker {
    sent: u64,
    expected_send: u64,
    done_sending: bool,
    received: u64,
    expected_receive: u64,
    done_receiving: bool,
    last: (f64, f64),
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes_sent(&mut self, sent: u64, expected: u64) {
        self.sent = sent;
        self.expected_send = expected;
    }

    /// The response started, so the request is fully sent.
    pub fn response_started(&mut self, expected_receive: Option<u64>) {
        self.done_sending = true;
        self.expected_receive = expected_receive.unwrap_or(0);
    }

    pub fn bytes_received(&mut self, count: u64) {
        self.done_sending = true;
        self.received += count;
    }

    pub fn finish(&mut self) {
        self.done_receiving = true;
    }

    /// Current fractions, clamped to `[0, 1]` and to the last reported pair.
    pub fn snapshot(&mut self) -> (f64, f64) {
        let sent = fraction(self.sent, self.expected_send, self.done_sending).max(self.last.0);
        let received =
            fraction(self.received, self.expected_receive, self.done_receiving).max(self.last.1);
        self.last = (sent, received);
        self.last
    }
}

fn fraction(count: u64, expected: u64, done: bool) -> f64 {
    if expected > 0 {
        (count as f64 / expected as f64).min(1.0)
    } else if done {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_sizes_report_ratios() {
        let mut p = ProgressTracker::new();
        p.bytes_sent(50, 200);
        assert_eq!(p.snapshot(), (0.25, 0.0));
        p.bytes_sent(200, 200);
        p.response_started(Some(4));
        p.bytes_received(1);
        assert_eq!(p.snapshot(), (1.0, 0.25));
        p.bytes_received(3);
        p.finish();
        assert_eq!(p.snapshot(), (1.0, 1.0));
    }

    #[test]
    fn unknown_sizes_jump_when_done() {
        let mut p = ProgressTracker::new();
        p.bytes_sent(0, 0);
        assert_eq!(p.snapshot(), (0.0, 0.0));
        p.response_started(None);
        p.bytes_received(10);
        assert_eq!(p.snapshot(), (1.0, 0.0));
        p.finish();
        assert_eq!(p.snapshot(), (1.0, 1.0));
    }

    #[test]
    fn values_never_decrease() {
        let mut p = ProgressTracker::new();
        p.bytes_sent(80, 100);
        assert_eq!(p.snapshot().0, 0.8);
        // A transport that restarts its counter must not move progress back.
        p.bytes_sent(10, 100);
        assert_eq!(p.snapshot().0, 0.8);
    }

    #[test]
    fn overshoot_is_clamped() {
        let mut p = ProgressTracker::new();
        p.response_started(Some(2));
        p.bytes_received(5);
        assert_eq!(p.snapshot().1, 1.0);
    }
}
