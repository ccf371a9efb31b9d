use kasane::{BoxError, EventQueue};
use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

#[derive(Clone, Debug)]
struct Job {
    id: u32,
    delay: Duration,
}

impl kasane::Message for Job {}

fn job(id: u32, millis: u64) -> Job {
    Job {
        id,
        delay: Duration::from_millis(millis),
    }
}

fn recording_queue() -> (EventQueue<Job>, Arc<Mutex<Vec<u32>>>) {
    let finished = Arc::new(Mutex::new(Vec::new()));
    let log = finished.clone();
    let queue = EventQueue::new(move |job: Job| {
        let log = log.clone();
        async move {
            tokio::time::sleep(job.delay).await;
            log.lock().unwrap().push(job.id);
            Ok::<(), BoxError>(())
        }
    });
    (queue, finished)
}

#[tokio::test]
async fn test_tasks_complete_out_of_order() {
    let (queue, finished) = recording_queue();

    queue.add_batch([job(1, 50), job(2, 0), job(3, 0)]);
    assert_eq!(queue.pending(), 3);
    assert_eq!(queue.queued(), 0);

    queue.on_idle().await;

    let finished = finished.lock().unwrap().clone();
    assert_eq!(finished.len(), 3);
    assert_eq!(finished.last(), Some(&1));
    assert_eq!(queue.pending(), 0);
}

#[tokio::test]
async fn test_on_idle_waits_for_every_task() {
    let (queue, finished) = recording_queue();

    queue.add(job(1, 20));
    queue.add(job(2, 10));

    let waiters = futures::future::join(queue.on_idle(), queue.on_idle());
    waiters.await;

    assert_eq!(finished.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_stop_gives_up_after_timeout() {
    let (queue, finished) = recording_queue();
    queue.add(job(1, 5_000));

    let started = Instant::now();
    queue.stop_within(Duration::from_millis(100)).await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(1_000));
    assert!(!queue.is_active());
    assert_eq!(queue.pending(), 1);
    assert!(finished.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_stop_waits_for_in_flight_work() {
    let (queue, finished) = recording_queue();
    queue.add(job(1, 30));

    queue.stop().await;

    assert_eq!(*finished.lock().unwrap(), vec![1]);
    queue.add(job(2, 0));
    assert_eq!(queue.queued(), 1);
}
