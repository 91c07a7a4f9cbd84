//! Input and output pin wiring
//!
//! Each pin is backed by an unbounded crossbeam channel. The mixer keeps the
//! receiving end of inputs and the sending end of outputs; the surrounding
//! pipeline owns the other ends.

use crate::types::{Frame, MAX_CHANNELS};
use crossbeam::channel::{self, Receiver, Sender};

pub(crate) struct InputPorts {
    queues: [Option<Receiver<Frame>>; MAX_CHANNELS],
}

impl InputPorts {
    pub fn new() -> Self {
        Self {
            queues: std::array::from_fn(|_| None),
        }
    }

    /// Wire `pin`, replacing any previous producer
    pub fn connect(&mut self, pin: usize) -> Sender<Frame> {
        let (tx, rx) = channel::unbounded();
        self.queues[pin] = Some(rx);
        tx
    }

    pub fn disconnect(&mut self, pin: usize) -> bool {
        self.queues[pin].take().is_some()
    }

    pub fn get(&self, pin: usize) -> Option<&Receiver<Frame>> {
        self.queues[pin].as_ref()
    }
}

pub(crate) struct OutputPorts {
    queues: [Option<Sender<Frame>>; MAX_CHANNELS],
}

impl OutputPorts {
    pub fn new() -> Self {
        Self {
            queues: std::array::from_fn(|_| None),
        }
    }

    /// Wire `pin`, replacing any previous consumer
    pub fn connect(&mut self, pin: usize) -> Receiver<Frame> {
        let (tx, rx) = channel::unbounded();
        self.queues[pin] = Some(tx);
        rx
    }

    pub fn disconnect(&mut self, pin: usize) -> bool {
        self.queues[pin].take().is_some()
    }

    pub fn is_connected(&self, pin: usize) -> bool {
        self.queues[pin].is_some()
    }

    /// Hand a frame to the consumer of `pin`
    ///
    /// Returns `false` when the consumer hung up; the pin is then unwired.
    pub fn send(&mut self, pin: usize, frame: Frame) -> bool {
        let Some(tx) = &self.queues[pin] else {
            return false;
        };

        if tx.send(frame).is_ok() {
            return true;
        }

        log::debug!("output pin {} consumer hung up, unwiring", pin);
        self.queues[pin] = None;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_connect_replaces() {
        let mut inputs = InputPorts::new();
        let old = inputs.connect(3);
        let new = inputs.connect(3);

        assert!(old.send(Frame::from_samples(vec![1])).is_err());
        new.send(Frame::from_samples(vec![2])).unwrap();
        assert_eq!(inputs.get(3).unwrap().len(), 1);

        assert!(inputs.disconnect(3));
        assert!(!inputs.disconnect(3));
        assert!(inputs.get(3).is_none());
    }

    #[test]
    fn test_output_send() {
        let mut outputs = OutputPorts::new();
        assert!(!outputs.send(0, Frame::from_samples(vec![1])));

        let rx = outputs.connect(0);
        assert!(outputs.send(0, Frame::from_samples(vec![1, 2])));
        assert_eq!(rx.try_recv().unwrap().samples(), &[1, 2]);
    }

    #[test]
    fn test_output_pruned_on_hangup() {
        let mut outputs = OutputPorts::new();
        let rx = outputs.connect(5);
        drop(rx);

        assert!(!outputs.send(5, Frame::from_samples(vec![0])));
        assert!(!outputs.is_connected(5));
    }
}
