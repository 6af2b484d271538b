/// Upload fraction driven by bytes handed to the transport.
///
/// Client-side byte counts say nothing about whether the server accepted the
/// request, so the fraction is held at [`UploadProgress::CAP`] until
/// [`UploadProgress::finish`] is called on acknowledgement.
#[derive(Debug, Clone)]
pub struct UploadProgress {
    total_bytes: u64,
    sent_bytes: u64,
    last: f64,
    finished: bool,
}

impl UploadProgress {
    pub const CAP: f64 = 0.99;

    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            sent_bytes: 0,
            last: 0.0,
            finished: false,
        }
    }

    /// Records `bytes` more sent. Returns the new fraction only when it grew.
    pub fn advance(&mut self, bytes: u64) -> Option<f64> {
        if self.finished {
            return None;
        }

        self.sent_bytes = self.sent_bytes.saturating_add(bytes);
        if self.total_bytes == 0 {
            return None;
        }

        let fraction = (self.sent_bytes as f64 / self.total_bytes as f64).min(Self::CAP);
        if fraction > self.last {
            self.last = fraction;
            Some(fraction)
        } else {
            None
        }
    }

    /// Server acknowledged. Yields `1.0` the first time only.
    pub fn finish(&mut self) -> Option<f64> {
        if self.finished {
            return None;
        }
        self.finished = true;
        self.last = 1.0;
        Some(1.0)
    }

    pub fn fraction(&self) -> f64 {
        self.last
    }

    pub fn sent_bytes(&self) -> u64 {
        self.sent_bytes
    }
}
