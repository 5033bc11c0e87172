/// Occurrence counter which lets one of every `interval` consecutive occurrences through
#[derive(Debug, Clone)]
pub(crate) struct OccurrenceLimiter {
    interval: u32,
    remaining: u32,
}

impl OccurrenceLimiter {
    pub(crate) const fn new(interval: u32) -> Self {
        Self {
            interval,
            remaining: 0,
        }
    }

    /// Register an occurrence, returns `true` if it should be reported
    pub(crate) fn hit(&mut self) -> bool {
        if self.remaining == 0 {
            self.remaining = self.interval.saturating_sub(1);
            true
        } else {
            self.remaining -= 1;
            false
        }
    }

    /// The streak of occurrences ended
    pub(crate) fn reset(&mut self) {
        self.remaining = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_report_per_interval() {
        for (hits, expected) in [(1, 1), (250, 1), (251, 2), (500, 2), (501, 3), (1000, 4)] {
            let mut limiter = OccurrenceLimiter::new(250);
            let reported = (0..hits).filter(|_| limiter.hit()).count();
            assert_eq!(reported, expected, "{hits} hits");
        }
    }

    #[test]
    fn reset_starts_new_streak() {
        let mut limiter = OccurrenceLimiter::new(250);
        assert!(limiter.hit());
        assert!(!limiter.hit());

        limiter.reset();
        assert!(limiter.hit());
    }
}
