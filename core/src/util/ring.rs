use std::sync::{Arc, Mutex};

/// Bounded byte ring that keeps only the most recent `cap` bytes.
///
/// Implemented as a fixed-size circular buffer with a write cursor; shared
/// between a pump task and the result assembly.
#[derive(Debug)]
pub struct RingTail {
    cap: usize,
    window: Mutex<Window>,
}

#[derive(Debug)]
struct Window {
    buf: Vec<u8>,
    /// Next write position; once `wrapped`, also the oldest retained byte.
    cursor: usize,
    wrapped: bool,
}

impl RingTail {
    pub fn new(cap: usize) -> Arc<Self> {
        Arc::new(Self {
            cap,
            window: Mutex::new(Window {
                buf: Vec::new(),
                cursor: 0,
                wrapped: false,
            }),
        })
    }

    pub fn push(&self, data: &[u8]) {
        if self.cap == 0 || data.is_empty() {
            return;
        }
        // Only the trailing window of an oversized chunk can survive.
        let data = &data[data.len().saturating_sub(self.cap)..];

        let mut w = self.window.lock().unwrap();
        if w.buf.len() < self.cap {
            w.buf.resize(self.cap, 0);
        }

        let cursor = w.cursor;
        let until_end = self.cap - cursor;
        if data.len() <= until_end {
            w.buf[cursor..cursor + data.len()].copy_from_slice(data);
        } else {
            let (head, tail) = data.split_at(until_end);
            w.buf[cursor..].copy_from_slice(head);
            w.buf[..tail.len()].copy_from_slice(tail);
        }

        if cursor + data.len() >= self.cap {
            w.wrapped = true;
        }
        w.cursor = (cursor + data.len()) % self.cap;
    }

    /// Snapshot of the retained tail, oldest byte first, lossily decoded.
    pub fn tail_string(&self) -> String {
        let w = self.window.lock().unwrap();
        if !w.wrapped {
            return String::from_utf8_lossy(&w.buf[..w.cursor]).into_owned();
        }
        let mut ordered = Vec::with_capacity(self.cap);
        ordered.extend_from_slice(&w.buf[w.cursor..]);
        ordered.extend_from_slice(&w.buf[..w.cursor]);
        String::from_utf8_lossy(&ordered).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_only_tail_bytes() {
        let ring = RingTail::new(4);
        ring.push(b"abcdef");
        assert_eq!(ring.tail_string(), "cdef");
        ring.push(b"gh");
        assert_eq!(ring.tail_string(), "efgh");
    }

    #[test]
    fn oversized_single_push_truncates_from_front() {
        let ring = RingTail::new(3);
        ring.push(b"0123456789");
        assert_eq!(ring.tail_string(), "789");
    }

    #[test]
    fn partial_fill_reads_in_order() {
        let ring = RingTail::new(16);
        ring.push(b"ab");
        ring.push(b"cd");
        assert_eq!(ring.tail_string(), "abcd");
    }

    #[test]
    fn wrap_across_many_small_pushes() {
        let ring = RingTail::new(5);
        for chunk in [b"ab".as_slice(), b"cde", b"fg", b"h"] {
            ring.push(chunk);
        }
        assert_eq!(ring.tail_string(), "defgh");
    }

    #[test]
    fn zero_capacity_stays_empty() {
        let ring = RingTail::new(0);
        ring.push(b"anything");
        assert_eq!(ring.tail_string(), "");
    }
}
