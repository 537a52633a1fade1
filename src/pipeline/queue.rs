//! 有界阻塞队列
//!
//! 单个互斥锁保护队列内容和阻塞标志，两个条件变量分别对应"非空"和"非满"。
//! `unblock()` 之后 push/pop 不再等待：队列满时 push 直接丢弃元素，队列空时 pop 返回 `None`。
//! 这保证生产线程在收尾阶段永远不会卡死。

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;

/// push 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// 已入队
    Queued,
    /// 队列已解除阻塞（或已取消）且没有空位，元素被释放
    Dropped,
}

struct QueueState<T> {
    items: VecDeque<T>,
    blocking: bool,
    cancelled: bool,
    dropped: u64,
}

pub struct BoundedBlockingQueue<T> {
    state: Mutex<QueueState<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
}

impl<T> BoundedBlockingQueue<T> {
    /// 创建空队列，初始为阻塞模式
    ///
    /// # Panics
    ///
    /// `capacity` 为 0 时 panic。
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "队列容量必须大于 0");
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                blocking: true,
                cancelled: false,
                dropped: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
        }
    }

    /// 入队（队列满且处于阻塞模式时等待）
    pub fn push(&self, item: T) -> PushOutcome {
        let mut state = self.state.lock();
        while state.items.len() >= self.capacity && state.blocking && !state.cancelled {
            self.not_full.wait(&mut state);
        }

        if state.cancelled || state.items.len() >= self.capacity {
            state.dropped += 1;
            drop(state);
            drop(item);
            return PushOutcome::Dropped;
        }

        state.items.push_back(item);
        self.not_empty.notify_one();
        PushOutcome::Queued
    }

    /// 出队（队列空且处于阻塞模式时等待）
    ///
    /// 返回 `None` 表示队列已解除阻塞且没有剩余元素，或队列已被取消。
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        while state.items.is_empty() && state.blocking && !state.cancelled {
            self.not_empty.wait(&mut state);
        }

        if state.cancelled {
            return None;
        }

        // 可能被其他消费者抢先取走
        let item = state.items.pop_front()?;
        self.not_full.notify_one();
        Some(item)
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.state.lock().items.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_blocking(&self) -> bool {
        self.state.lock().blocking
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    /// 被丢弃的 push 次数
    pub fn dropped_count(&self) -> u64 {
        self.state.lock().dropped
    }

    /// 解除阻塞：唤醒所有等待者，让它们重新检查条件后退出。可重复调用。
    pub fn unblock(&self) {
        let mut state = self.state.lock();
        state.blocking = false;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// 取消：pop 立即返回 `None`（即使还有元素），push 直接丢弃。不可撤销。
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        state.cancelled = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// 清空并恢复阻塞模式，返回被释放的元素个数
    ///
    /// 只用于重置，不在收尾流程中使用。取消状态保持不变。
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let removed = std::mem::replace(&mut state.items, VecDeque::with_capacity(self.capacity));
        state.blocking = true;
        self.not_full.notify_one();
        drop(state);
        removed.len()
    }

    /// 销毁队列，释放仍在队列中的元素，返回其个数
    ///
    /// 按值消费队列：调用方必须已经拿回唯一所有权（例如 `Arc::try_unwrap`），
    /// 因此不可能还有线程阻塞在 push/pop 中。
    pub fn destroy(self) -> usize {
        let state = self.state.into_inner();
        state.items.len()
    }
}

/// 与元素类型无关的队列控制面，供会话句柄和日志使用
pub trait QueueControl: Send + Sync {
    fn cancel(&self);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Send> QueueControl for BoundedBlockingQueue<T> {
    fn cancel(&self) {
        BoundedBlockingQueue::cancel(self)
    }

    fn len(&self) -> usize {
        BoundedBlockingQueue::len(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{bounded, unbounded};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    const SETTLE: Duration = Duration::from_millis(100);
    const BOUND: Duration = Duration::from_secs(5);

    struct Tracked {
        drops: Arc<AtomicUsize>,
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn pops_in_push_order() {
        let queue = BoundedBlockingQueue::new(64);
        for i in 0..50 {
            assert_eq!(queue.push(i), PushOutcome::Queued);
        }
        let popped: Vec<i32> = (0..50).filter_map(|_| queue.pop()).collect();
        assert_eq!(popped, (0..50).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[test]
    fn one_two_three_then_none_after_unblock() {
        let queue = BoundedBlockingQueue::new(50);
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        queue.unblock();
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn push_blocks_at_capacity_until_pop() {
        let queue = Arc::new(BoundedBlockingQueue::new(2));
        queue.push(1);
        queue.push(2);
        assert!(queue.is_full());

        let (done_tx, done_rx) = bounded(1);
        let pusher = {
            let queue = queue.clone();
            thread::spawn(move || {
                let outcome = queue.push(3);
                done_tx.send(outcome).unwrap();
            })
        };

        assert!(done_rx.recv_timeout(SETTLE).is_err(), "第三次 push 应当阻塞");
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(done_rx.recv_timeout(BOUND).unwrap(), PushOutcome::Queued);
        pusher.join().unwrap();

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
    }

    #[test]
    fn unblock_releases_blocked_pop() {
        let queue: Arc<BoundedBlockingQueue<u32>> = Arc::new(BoundedBlockingQueue::new(4));
        let (done_tx, done_rx) = bounded(1);
        let popper = {
            let queue = queue.clone();
            thread::spawn(move || done_tx.send(queue.pop()).unwrap())
        };

        assert!(done_rx.recv_timeout(SETTLE).is_err(), "空队列上的 pop 应当阻塞");
        queue.unblock();
        assert_eq!(done_rx.recv_timeout(BOUND).unwrap(), None);
        popper.join().unwrap();
    }

    #[test]
    fn unblock_releases_blocked_push_and_drops_item() {
        let drops = Arc::new(AtomicUsize::new(0));
        let queue = Arc::new(BoundedBlockingQueue::new(1));
        queue.push(Tracked { drops: drops.clone() });

        let (done_tx, done_rx) = bounded(1);
        let pusher = {
            let queue = queue.clone();
            let drops = drops.clone();
            thread::spawn(move || done_tx.send(queue.push(Tracked { drops })).unwrap())
        };

        assert!(done_rx.recv_timeout(SETTLE).is_err(), "满队列上的 push 应当阻塞");
        queue.unblock();
        assert_eq!(done_rx.recv_timeout(BOUND).unwrap(), PushOutcome::Dropped);
        pusher.join().unwrap();

        assert_eq!(drops.load(Ordering::SeqCst), 1, "被丢弃的元素应立即释放");
        assert_eq!(queue.dropped_count(), 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn unblock_still_accepts_push_with_room() {
        let queue = BoundedBlockingQueue::new(2);
        queue.unblock();
        queue.unblock();
        assert_eq!(queue.push('a'), PushOutcome::Queued);
        assert_eq!(queue.push('b'), PushOutcome::Queued);
        assert_eq!(queue.push('c'), PushOutcome::Dropped);
        assert_eq!(queue.pop(), Some('a'));
        assert_eq!(queue.pop(), Some('b'));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn two_consumers_share_ten_items_exactly_once() {
        let queue = Arc::new(BoundedBlockingQueue::new(50));
        let (item_tx, item_rx) = unbounded();
        let (finished_tx, finished_rx) = unbounded();

        let consumers: Vec<_> = (0..2)
            .map(|id| {
                let queue = queue.clone();
                let item_tx = item_tx.clone();
                let finished_tx = finished_tx.clone();
                thread::spawn(move || {
                    while let Some(item) = queue.pop() {
                        item_tx.send(item).unwrap();
                    }
                    finished_tx.send(id).unwrap();
                })
            })
            .collect();
        drop(item_tx);
        drop(finished_tx);

        for i in 0..10 {
            queue.push(i);
        }
        queue.unblock();

        let mut finished = HashSet::new();
        for _ in 0..2 {
            finished.insert(finished_rx.recv_timeout(BOUND).unwrap());
        }
        assert_eq!(finished.len(), 2);
        for consumer in consumers {
            consumer.join().unwrap();
        }

        let mut delivered: Vec<i32> = item_rx.iter().collect();
        delivered.sort_unstable();
        assert_eq!(delivered, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn cancel_wakes_pop_and_leaves_items_for_destroy() {
        let queue = Arc::new(BoundedBlockingQueue::new(4));
        queue.push(1);
        queue.push(2);
        queue.cancel();
        assert_eq!(queue.pop(), None);
        assert_eq!(queue.push(3), PushOutcome::Dropped);

        let queue = Arc::try_unwrap(queue).ok().unwrap();
        assert_eq!(queue.destroy(), 2);
    }

    #[test]
    fn cancel_wakes_blocked_pop() {
        let queue: Arc<BoundedBlockingQueue<u8>> = Arc::new(BoundedBlockingQueue::new(1));
        let (done_tx, done_rx) = bounded(1);
        let popper = {
            let queue = queue.clone();
            thread::spawn(move || done_tx.send(queue.pop()).unwrap())
        };
        assert!(done_rx.recv_timeout(SETTLE).is_err());
        queue.cancel();
        assert_eq!(done_rx.recv_timeout(BOUND).unwrap(), None);
        popper.join().unwrap();
    }

    #[test]
    fn destroy_releases_each_remaining_item_once() {
        let drops = Arc::new(AtomicUsize::new(0));
        let queue = Arc::new(BoundedBlockingQueue::new(8));

        let producer = {
            let queue = queue.clone();
            let drops = drops.clone();
            thread::spawn(move || {
                for _ in 0..6 {
                    queue.push(Tracked { drops: drops.clone() });
                }
            })
        };
        producer.join().unwrap();

        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || {
                for _ in 0..2 {
                    drop(queue.pop());
                }
            })
        };
        consumer.join().unwrap();
        assert_eq!(drops.load(Ordering::SeqCst), 2);

        let queue = Arc::try_unwrap(queue).ok().unwrap();
        assert_eq!(queue.destroy(), 4);
        assert_eq!(drops.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn clear_restores_blocking() {
        let queue = Arc::new(BoundedBlockingQueue::new(3));
        queue.push(7);
        queue.push(8);
        queue.unblock();
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert!(queue.is_blocking());

        let (done_tx, done_rx) = bounded(1);
        let popper = {
            let queue = queue.clone();
            thread::spawn(move || done_tx.send(queue.pop()).unwrap())
        };
        assert!(done_rx.recv_timeout(SETTLE).is_err(), "clear 之后 pop 应重新阻塞");
        queue.push(9);
        assert_eq!(done_rx.recv_timeout(BOUND).unwrap(), Some(9));
        popper.join().unwrap();
    }

    #[test]
    #[should_panic]
    fn zero_capacity_panics() {
        let _ = BoundedBlockingQueue::<u8>::new(0);
    }
}
