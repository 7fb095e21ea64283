//! Thread-per-node scheduler for decode pipelines
//!
//! Each node runs on a dedicated thread; the scheduler calls `work()`
//! repeatedly until the node reports `should_stop()` or returns an error.
//! `WorkError::Shutdown` is the normal end of a run (the input stream was
//! exhausted). Any other error is recorded as a node failure.
//!
//! A decoder's state machine is never split across threads: a single
//! `work()` call drives its whole `decode()` sequence of waits and emits.

use super::errors::WorkError;
use super::node::ProcessNode;
use super::ports::{InputPort, OutputPort};
use super::watchdog::Watchdog;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver as StdReceiver, Sender as StdSender, channel};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info};

/// How a node's thread ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    /// Input exhausted or node finished on its own
    Completed { items: usize },
    /// Stopped by `Scheduler::stop()`
    Stopped { items: usize },
    /// Aborted by a configuration error or consistency defect
    Failed { error: String },
    /// The node's thread panicked
    Panicked,
}

/// Runtime scheduler that executes a pipeline
pub struct Scheduler {
    threads: Vec<(String, JoinHandle<NodeOutcome>)>,
    stop_signal: Arc<AtomicBool>,
    completion_tx: StdSender<String>,
    completion_rx: StdReceiver<String>,
    watchdog: Watchdog,
    watchdog_handle: JoinHandle<()>,
}

impl Scheduler {
    /// Create a new scheduler with watchdog monitoring
    pub fn new() -> Self {
        let (completion_tx, completion_rx) = channel();
        let watchdog = Watchdog::new();
        let watchdog_handle = watchdog.start_monitoring_thread();
        debug!("Watchdog enabled - will report operations blocked >5 seconds");
        Self {
            threads: Vec::new(),
            stop_signal: Arc::new(AtomicBool::new(false)),
            completion_tx,
            completion_rx,
            watchdog,
            watchdog_handle,
        }
    }

    /// Get a reference to the watchdog
    pub fn watchdog(&self) -> &Watchdog {
        &self.watchdog
    }

    /// Start a node in its own thread
    pub fn start_process(&mut self, mut node: Box<dyn ProcessNode>, inputs: Vec<InputPort>, outputs: Vec<OutputPort>) {
        let stop_signal = Arc::clone(&self.stop_signal);
        let completion_tx = self.completion_tx.clone();
        let name = node.name().to_string();
        let thread_name = name.clone();

        debug!("Starting process node: {}", name);

        let handle = thread::spawn(move || {
            let mut items_produced = 0usize;

            let outcome = loop {
                if stop_signal.load(Ordering::Relaxed) {
                    break NodeOutcome::Stopped { items: items_produced };
                }
                if node.should_stop() {
                    break NodeOutcome::Completed { items: items_produced };
                }

                match node.work(&inputs, &outputs) {
                    Ok(n) => items_produced += n,
                    Err(WorkError::Shutdown) => {
                        break NodeOutcome::Completed { items: items_produced };
                    }
                    Err(e) => {
                        error!("[{}] Work error: {}", thread_name, e);
                        break NodeOutcome::Failed { error: e.to_string() };
                    }
                }
            };

            info!("[{}] Shutdown. Produced {} items.", thread_name, items_produced);

            // Dropping the ports disconnects channels for anything still waiting
            drop(outputs);
            drop(inputs);
            drop(node);

            let _ = completion_tx.send(thread_name);
            outcome
        });

        self.threads.push((name, handle));
    }

    /// Signal all nodes to stop
    pub fn stop(&self) {
        self.stop_signal.store(true, Ordering::Relaxed);
    }

    /// Wait for all node threads to complete and return each node's outcome
    pub fn wait(self) -> HashMap<String, NodeOutcome> {
        let Scheduler {
            threads,
            completion_tx,
            completion_rx,
            watchdog,
            watchdog_handle,
            ..
        } = self;

        // Drop our sender so the channel closes once every node thread is done
        drop(completion_tx);

        let total_threads = threads.len();
        let mut threads_by_name: HashMap<String, JoinHandle<NodeOutcome>> = threads.into_iter().collect();
        let mut outcomes = HashMap::new();

        debug!("Waiting for {} threads to complete...", total_threads);

        while let Ok(thread_name) = completion_rx.recv() {
            if let Some(handle) = threads_by_name.remove(&thread_name) {
                let outcome = handle.join().unwrap_or(NodeOutcome::Panicked);
                debug!("[{}] Thread completed: {:?}", thread_name, outcome);
                outcomes.insert(thread_name, outcome);
            }
        }

        // Threads that panicked before notifying
        for (thread_name, handle) in threads_by_name {
            let outcome = handle.join().unwrap_or(NodeOutcome::Panicked);
            error!("[{}] Thread ended without notification: {:?}", thread_name, outcome);
            outcomes.insert(thread_name, outcome);
        }

        info!("All {} threads completed", total_threads);

        watchdog.stop();
        let _ = watchdog_handle.join();
        outcomes
    }

    /// Get the number of running threads
    pub fn num_threads(&self) -> usize {
        self.threads.len()
    }

    /// Get the names of all running threads
    pub fn thread_names(&self) -> Vec<String> {
        self.threads.iter().map(|(name, _)| name.clone()).collect()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::node::{WorkError, WorkResult};
    use crate::runtime::sender::{ChannelMessage, Sender};
    use crossbeam_channel::bounded;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct CountingSource {
        count: u32,
        max: u32,
    }

    impl ProcessNode for CountingSource {
        fn name(&self) -> &str {
            "counting_source"
        }

        fn num_inputs(&self) -> usize {
            0
        }

        fn num_outputs(&self) -> usize {
            1
        }

        fn work(&mut self, _inputs: &[InputPort], outputs: &[OutputPort]) -> WorkResult<usize> {
            let output = outputs[0]
                .get::<u32>()
                .ok_or_else(|| WorkError::NodeError("Missing output channel".to_string()))?;
            if self.count == self.max {
                output.close();
                return Err(WorkError::Shutdown);
            }
            output.send(self.count)?;
            self.count += 1;
            Ok(1)
        }
    }

    struct CollectingSink {
        buffer: VecDeque<u32>,
        received: Arc<Mutex<Vec<u32>>>,
    }

    impl ProcessNode for CollectingSink {
        fn name(&self) -> &str {
            "collecting_sink"
        }

        fn num_inputs(&self) -> usize {
            1
        }

        fn num_outputs(&self) -> usize {
            0
        }

        fn work(&mut self, inputs: &[InputPort], _outputs: &[OutputPort]) -> WorkResult<usize> {
            let mut input = inputs[0]
                .get::<u32>(&mut self.buffer)
                .ok_or_else(|| WorkError::NodeError("Missing input channel".to_string()))?;
            let value = input.recv()?;
            self.received.lock().unwrap().push(value);
            Ok(1)
        }
    }

    struct FailingNode;

    impl ProcessNode for FailingNode {
        fn name(&self) -> &str {
            "failing"
        }

        fn work(&mut self, _inputs: &[InputPort], _outputs: &[OutputPort]) -> WorkResult<usize> {
            Err(WorkError::Defect("table mismatch".into()))
        }
    }

    #[test]
    fn test_scheduler_runs_to_completion() {
        let mut scheduler = Scheduler::new();
        let (tx, rx) = bounded::<ChannelMessage<u32>>(2);
        let watchdog = scheduler.watchdog().clone();
        let received = Arc::new(Mutex::new(Vec::new()));

        scheduler.start_process(
            Box::new(CountingSource { count: 0, max: 5 }),
            vec![],
            vec![OutputPort::new_with_watchdog(Sender::new(vec![tx]), &watchdog, "counting_source", "out")],
        );
        scheduler.start_process(
            Box::new(CollectingSink {
                buffer: VecDeque::new(),
                received: Arc::clone(&received),
            }),
            vec![InputPort::new_with_watchdog(rx, &watchdog, "collecting_sink", "in")],
            vec![],
        );

        let outcomes = scheduler.wait();
        assert_eq!(*received.lock().unwrap(), vec![0, 1, 2, 3, 4]);
        assert_eq!(outcomes["counting_source"], NodeOutcome::Completed { items: 5 });
        assert_eq!(outcomes["collecting_sink"], NodeOutcome::Completed { items: 5 });
    }

    #[test]
    fn test_defect_is_reported_as_failure() {
        let mut scheduler = Scheduler::new();
        scheduler.start_process(Box::new(FailingNode), vec![], vec![]);
        let outcomes = scheduler.wait();
        assert!(matches!(
            &outcomes["failing"],
            NodeOutcome::Failed { error } if error.contains("table mismatch")
        ));
    }
}
