/// Signal returned by a termination predicate for every checked sample.
///
/// Two orthogonal decisions are packed in each variant: whether the current
/// sample should become the new end of the output trajectory, and whether
/// integration should stop after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Stop now and output whatever was cached.
    Terminate,
    /// Cache this sample and keep integrating.
    CacheAndContinue,
    Continue,
    /// Cache this sample and stop.
    CacheAndTerminate,
}

impl Status {
    pub fn new(cache: bool, terminate: bool) -> Self {
        match (cache, terminate) {
            (true, true) => Status::CacheAndTerminate,
            (true, false) => Status::CacheAndContinue,
            (false, true) => Status::Terminate,
            (false, false) => Status::Continue,
        }
    }

    pub fn does_cache(self) -> bool {
        matches!(self, Status::CacheAndContinue | Status::CacheAndTerminate)
    }

    pub fn does_terminate(self) -> bool {
        matches!(self, Status::Terminate | Status::CacheAndTerminate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoding() {
        assert!(Status::CacheAndContinue.does_cache());
        assert!(!Status::CacheAndContinue.does_terminate());
        assert!(Status::CacheAndTerminate.does_cache());
        assert!(Status::CacheAndTerminate.does_terminate());
        assert!(!Status::Terminate.does_cache());
        assert!(Status::Terminate.does_terminate());
        assert!(!Status::Continue.does_cache());
        assert!(!Status::Continue.does_terminate());
    }

    #[test]
    fn test_new_round_trips_bits() {
        for status in [
            Status::Terminate,
            Status::CacheAndContinue,
            Status::Continue,
            Status::CacheAndTerminate,
        ] {
            assert_eq!(Status::new(status.does_cache(), status.does_terminate()), status);
        }
    }
}
