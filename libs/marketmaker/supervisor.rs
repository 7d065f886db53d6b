//! Generic actor-thread supervision (§3 Lifecycle: "on thread termination
//! the supervising object restarts it").
//!
//! Each actor's inbound channel is created once, at spawn time, and never
//! recreated. `crossbeam_channel::Receiver` is a cheap, cloneable handle
//! onto the same underlying queue, so a supervisor thread can hand a fresh
//! clone of it to each worker generation — callers never see their
//! `Sender`/`Handle` change across a restart, only the worker behind it.
//!
//! Whether to restart is decided entirely by `run`'s own return value, never
//! by peeking at the shared channel from out here: `rx` is the same queue
//! the worker itself reads from, so polling it for a disconnect signal
//! between worker generations could pop (and silently discard) a real
//! message that happened to arrive in that narrow window. `run` already
//! knows, from the inside, whether its `for msg in rx.iter() {}` loop ran
//! to completion (every `Sender` gone — an ordinary shutdown) or whether it
//! returned early for some other reason (an invariant violation, §7.3) —
//! that is the one authoritative signal, so it is the one we use.

use std::panic::AssertUnwindSafe;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use tracing::{error, warn};

/// Runs `run` on a dedicated worker thread and keeps it alive: if the
/// worker panics, or returns `false` (an early return, not a clean drain of
/// `rx`), a fresh worker thread is spawned against a clone of the same
/// receiver. `run` must return `true` only when it exits because `rx`'s
/// iterator ran dry (every `Sender` dropped) — that is treated as an
/// ordinary shutdown and supervision stops.
pub fn supervise<M, F>(actor: &'static str, rx: Receiver<M>, run: F) -> JoinHandle<()>
where
    M: Send + 'static,
    F: Fn(Receiver<M>) -> bool + Send + 'static,
{
    thread::Builder::new()
        .name(format!("{actor}-supervisor"))
        .spawn(move || loop {
            let worker_rx = rx.clone();
            let result = std::panic::catch_unwind(AssertUnwindSafe(|| run(worker_rx)));

            match result {
                Ok(true) => return,
                Ok(false) => warn!(actor, "worker exited early, restarting"),
                Err(_) => error!(actor, "worker panicked, restarting"),
            }
        })
        .expect("failed to spawn supervisor thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{unbounded, Sender};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn restarts_worker_after_early_return() {
        let (tx, rx) = unbounded::<()>();
        let generations = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&generations);

        let _supervisor = supervise("test-actor", rx, move |worker_rx| {
            counted.fetch_add(1, Ordering::SeqCst);
            let _ = worker_rx.recv();
            false
        });

        tx.send(()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));
        tx.send(()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));

        assert!(generations.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn stops_once_sender_dropped() {
        let (tx, rx) = unbounded::<()>();
        let ran = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&ran);

        let supervisor = supervise("test-actor-2", rx, move |worker_rx| {
            counted.fetch_add(1, Ordering::SeqCst);
            for _ in worker_rx.iter() {}
            true
        });

        drop(tx);
        supervisor.join().unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn messages_sent_right_after_an_early_return_are_not_lost() {
        // Every generation answers exactly one message with a reply, then
        // returns early (`false`), so the next generation is restarted
        // against the same queue. A message queued immediately after a
        // generation returns must still reach the next one rather than
        // being swallowed by a disconnect check on the shared channel.
        let (tx, rx) = unbounded::<Sender<u32>>();
        let seen = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&seen);

        let _supervisor = supervise("test-actor-3", rx, move |worker_rx| {
            if let Ok(reply) = worker_rx.recv() {
                counted.fetch_add(1, Ordering::SeqCst);
                let _ = reply.send(1);
            }
            false
        });

        for _ in 0..20 {
            let (reply_tx, reply_rx) = unbounded();
            tx.send(reply_tx).unwrap();
            assert_eq!(reply_rx.recv(), Ok(1));
        }
        assert_eq!(seen.load(Ordering::SeqCst), 20);
    }
}
