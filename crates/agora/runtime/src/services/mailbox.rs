//! Role mailboxes

use agora_types::Message;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Incoming message queue of a role
pub trait Mailbox: Send + Sync {
    /// Enqueue a message. Returns false if it was rejected.
    fn add(&self, message: Message) -> bool;

    fn remove_first(&self) -> Option<Message>;

    fn first(&self) -> Option<Message>;

    /// Copy of the visible messages, oldest first
    fn snapshot(&self) -> Vec<Message>;

    /// Remove and return every visible message
    fn drain(&self) -> Vec<Message>;

    /// Remove and return the visible messages of `kind`, leaving the rest
    fn drain_kind(&self, kind: &str) -> Vec<Message>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make buffered messages visible. No-op for unbuffered mailboxes.
    fn synchronize(&self) {}
}

/// FIFO mailbox, optionally buffered
#[derive(Default)]
pub struct FifoMailbox {
    visible: Mutex<VecDeque<Message>>,
    buffer: Option<Mutex<Vec<Message>>>,
}

impl FifoMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages stay hidden until [`Mailbox::synchronize`]
    pub fn buffered() -> Self {
        Self {
            visible: Mutex::new(VecDeque::new()),
            buffer: Some(Mutex::new(Vec::new())),
        }
    }

    pub fn is_buffered(&self) -> bool {
        self.buffer.is_some()
    }
}

impl Mailbox for FifoMailbox {
    fn add(&self, message: Message) -> bool {
        match &self.buffer {
            Some(buffer) => buffer.lock().push(message),
            None => self.visible.lock().push_back(message),
        }
        true
    }

    fn remove_first(&self) -> Option<Message> {
        self.visible.lock().pop_front()
    }

    fn first(&self) -> Option<Message> {
        self.visible.lock().front().cloned()
    }

    fn snapshot(&self) -> Vec<Message> {
        self.visible.lock().iter().cloned().collect()
    }

    fn drain(&self) -> Vec<Message> {
        self.visible.lock().drain(..).collect()
    }

    fn drain_kind(&self, kind: &str) -> Vec<Message> {
        let mut visible = self.visible.lock();
        let (matching, rest): (VecDeque<Message>, VecDeque<Message>) =
            visible.drain(..).partition(|m| m.is_kind(kind));
        *visible = rest;
        matching.into_iter().collect()
    }

    fn len(&self) -> usize {
        self.visible.lock().len()
    }

    fn synchronize(&self) {
        if let Some(buffer) = &self.buffer {
            let pending: Vec<Message> = buffer.lock().drain(..).collect();
            self.visible.lock().extend(pending);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_fifo_order() {
        let mailbox = FifoMailbox::new();
        mailbox.add(Message::new("a", json!(1)));
        mailbox.add(Message::new("b", json!(2)));
        assert_eq!(mailbox.first().map(|m| m.kind().to_string()), Some("a".into()));
        assert_eq!(mailbox.len(), 2);
        assert_eq!(mailbox.remove_first().map(|m| m.content().clone()), Some(json!(1)));
        assert_eq!(mailbox.drain().len(), 1);
        assert!(mailbox.is_empty());
    }

    #[test]
    fn test_drain_kind_keeps_others_in_order() {
        let mailbox = FifoMailbox::new();
        for (kind, n) in [("vote", 1), ("chat", 2), ("vote", 3), ("chat", 4)] {
            mailbox.add(Message::new(kind, json!(n)));
        }
        let votes = mailbox.drain_kind("vote");
        let contents = |messages: &[Message]| -> Vec<Value> {
            messages.iter().map(|m| m.content().clone()).collect()
        };
        assert_eq!(contents(&votes), vec![json!(1), json!(3)]);
        let rest = mailbox.snapshot();
        assert_eq!(contents(&rest), vec![json!(2), json!(4)]);
    }

    #[test]
    fn test_buffered_until_synchronize() {
        let mailbox = FifoMailbox::buffered();
        mailbox.add(Message::new("a", json!(null)));
        assert!(mailbox.is_empty());
        mailbox.synchronize();
        assert_eq!(mailbox.len(), 1);
    }
}
