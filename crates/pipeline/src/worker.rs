//! 워커 풀 -- 세마포어로 제한되는 배치 소비 하네스
//!
//! [`WorkerPool`]은 고정 크기 `N`의 동시성으로 태스크 배치를
//! 소비합니다. 생산자는 틱마다 배치를 제출하고 전체 드레인을
//! 기다립니다. 워커 패닉은 해당 태스크에 격리되며(에러 로그),
//! 나머지 배치는 계속 처리됩니다.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::error;

/// 고정 동시성 워커 풀
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl WorkerPool {
    /// `workers`개의 동시 실행 슬롯을 가진 풀을 생성합니다.
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    /// 워커 수를 반환합니다.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// 태스크 배치를 소비하고 전체 완료를 기다립니다.
    ///
    /// 각 태스크는 세마포어 허가를 얻은 뒤 별도 태스크로 실행됩니다.
    /// 동시에 실행되는 태스크 수는 풀 크기를 넘지 않습니다.
    pub async fn run_batch<T, F, Fut>(&self, tasks: Vec<T>, consume: F)
    where
        T: Send + 'static,
        F: Fn(T) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut set = JoinSet::new();

        for task in tasks {
            let permit = match Arc::clone(&self.permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    error!("worker semaphore closed, dropping remaining batch");
                    break;
                }
            };

            let consume = consume.clone();
            set.spawn(async move {
                let _permit = permit;
                consume(task).await;
            });
        }

        while let Some(result) = set.join_next().await {
            if let Err(e) = result
                && e.is_panic()
            {
                error!("worker task panicked, continuing with remaining batch");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn processes_every_task() {
        let pool = WorkerPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<usize> = (0..50).collect();
        let counter_clone = Arc::clone(&counter);
        pool.run_batch(tasks, move |_| {
            let counter = Arc::clone(&counter_clone);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;

        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_pool_size() {
        let pool = WorkerPool::new(3);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<usize> = (0..20).collect();
        let active_clone = Arc::clone(&active);
        let peak_clone = Arc::clone(&peak);
        pool.run_batch(tasks, move |_| {
            let active = Arc::clone(&active_clone);
            let peak = Arc::clone(&peak_clone);
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn panicking_task_does_not_poison_batch() {
        let pool = WorkerPool::new(2);
        let done = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<usize> = (0..10).collect();
        let done_clone = Arc::clone(&done);
        pool.run_batch(tasks, move |n| {
            let done = Arc::clone(&done_clone);
            async move {
                if n == 3 {
                    panic!("boom");
                }
                done.fetch_add(1, Ordering::SeqCst);
            }
        })
        .await;

        assert_eq!(done.load(Ordering::SeqCst), 9);
    }

    #[tokio::test]
    async fn empty_batch_completes_immediately() {
        let pool = WorkerPool::new(2);
        pool.run_batch(Vec::<usize>::new(), |_| async {}).await;
    }

    #[test]
    fn zero_workers_clamped_to_one() {
        let pool = WorkerPool::new(0);
        assert_eq!(pool.workers(), 1);
    }
}
