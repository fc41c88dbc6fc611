use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use crossbeam::channel::{bounded, Receiver, Sender};
use crossbeam::thread::Scope;
use parking_lot::{Condvar, Mutex};
use tracing::warn;

pub const DEFAULT_MAX_WORKERS: usize = 50;

type Task<'env> = Box<dyn FnOnce() + Send + 'env>;

enum Message<'env> {
    Run(Task<'env>),
    Shutdown,
}

#[derive(Default)]
struct PoolState {
    workers: Mutex<usize>,
    pending: Mutex<usize>,
    idle: Condvar,
}

impl PoolState {
    fn finish_one(&self) {
        let mut pending = self.pending.lock();
        *pending -= 1;
        if *pending == 0 {
            self.idle.notify_all();
        }
    }
}

/// Bounded, lazily grown worker pool for one bulk operation.
///
/// A worker is started per submitted task until `max_workers` exist; the task
/// queue holds at most `max_workers` entries, so `add_task` applies
/// backpressure. A panicking task is logged and counted as finished; its
/// worker keeps serving the queue.
pub struct TaskPool<'scope, 'env: 'scope> {
    scope: &'scope Scope<'env>,
    sender: Sender<Message<'env>>,
    receiver: Receiver<Message<'env>>,
    state: Arc<PoolState>,
    max_workers: usize,
}

/// Runs `body` against a fresh pool, then closes the pool: returns only once
/// every submitted task has finished and every worker has exited. Tasks may
/// borrow anything that outlives this call.
pub fn scoped<'env, F, R>(max_workers: usize, body: F) -> R
where
    F: for<'scope> FnOnce(&TaskPool<'scope, 'env>) -> R,
{
    let outcome = crossbeam::thread::scope(|scope| {
        let pool = TaskPool::new(scope, max_workers);
        let result = body(&pool);
        pool.close();
        result
    });
    match outcome {
        Ok(result) => result,
        Err(payload) => std::panic::resume_unwind(payload),
    }
}

impl<'scope, 'env> TaskPool<'scope, 'env> {
    fn new(scope: &'scope Scope<'env>, max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        let (sender, receiver) = bounded(max_workers);
        TaskPool {
            scope,
            sender,
            receiver,
            state: Arc::new(PoolState::default()),
            max_workers,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn workers(&self) -> usize {
        *self.state.workers.lock()
    }

    pub fn add_task<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'env,
    {
        {
            let mut workers = self.state.workers.lock();
            if *workers < self.max_workers {
                *workers += 1;
                let receiver = self.receiver.clone();
                let state = Arc::clone(&self.state);
                let _handle = self.scope.spawn(move |_| worker(receiver, state));
            }
        }

        *self.state.pending.lock() += 1;
        // The pool holds a receiver for its whole life, so the channel
        // cannot be disconnected here.
        if self.sender.send(Message::Run(Box::new(task))).is_err() {
            self.state.finish_one();
        }
    }

    /// Waits for every pending task, then sends one shutdown per worker.
    fn close(self) {
        let mut pending = self.state.pending.lock();
        while *pending > 0 {
            self.state.idle.wait(&mut pending);
        }
        drop(pending);

        let workers = *self.state.workers.lock();
        for _ in 0..workers {
            let _ = self.sender.send(Message::Shutdown);
        }
    }
}

fn worker(receiver: Receiver<Message<'_>>, state: Arc<PoolState>) {
    loop {
        match receiver.recv() {
            Ok(Message::Run(task)) => {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(task)) {
                    warn!(panic = %panic_message(payload.as_ref()), "task panicked");
                }
                state.finish_one();
            }
            Ok(Message::Shutdown) | Err(_) => {
                *state.workers.lock() -= 1;
                return;
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn runs_every_task_before_returning() {
        let done = AtomicUsize::new(0);
        scoped(8, |pool| {
            for _ in 0..500 {
                pool.add_task(|| {
                    done.fetch_add(1, Ordering::SeqCst);
                });
            }
        });
        assert_eq!(done.load(Ordering::SeqCst), 500);
    }

    #[test]
    fn never_exceeds_max_workers() {
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let spawned = scoped(4, |pool| {
            for _ in 0..40 {
                pool.add_task(|| {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(2));
                    running.fetch_sub(1, Ordering::SeqCst);
                });
            }
            pool.workers()
        });
        assert!(spawned <= 4);
        assert!(peak.load(Ordering::SeqCst) <= 4);
    }

    #[test]
    fn workers_grow_lazily() {
        let spawned = scoped(50, |pool| {
            pool.add_task(|| {});
            pool.add_task(|| {});
            pool.workers()
        });
        assert_eq!(spawned, 2);
    }

    #[test]
    fn panicking_task_does_not_lose_the_rest() {
        let done = AtomicUsize::new(0);
        scoped(2, |pool| {
            for i in 0..20 {
                let done = &done;
                pool.add_task(move || {
                    if i % 5 == 0 {
                        panic!("task {} failed", i);
                    }
                    done.fetch_add(1, Ordering::SeqCst);
                });
            }
        });
        assert_eq!(done.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn tasks_borrow_from_the_caller() {
        let results = Mutex::new(Vec::new());
        let inputs = vec![1, 2, 3, 4];
        scoped(3, |pool| {
            for n in &inputs {
                let results = &results;
                pool.add_task(move || results.lock().push(n * 10));
            }
        });
        let mut results = results.into_inner();
        results.sort();
        assert_eq!(results, vec![10, 20, 30, 40]);
    }

    #[test]
    fn empty_pool_closes_immediately() {
        let value = scoped(DEFAULT_MAX_WORKERS, |_| 7);
        assert_eq!(value, 7);
    }
}
