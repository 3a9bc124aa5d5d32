use std::{
    borrow::Cow,
    io,
    num::NonZeroUsize,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

use tracing::debug;

use crate::event_loop::{EventLoop, EventLoopGroup, SingleThreadEventLoop};

/// 固定数量的 [`SingleThreadEventLoop`]，按轮询顺序分配给新通道。
#[derive(Debug)]
pub struct MultiThreadEventLoopGroup {
    loops: Vec<Arc<SingleThreadEventLoop>>,
    cursor: AtomicUsize,
}

impl MultiThreadEventLoopGroup {
    /// 启动 `threads` 个事件循环；`threads == 0` 时取可用并行度。
    pub fn new(threads: usize) -> io::Result<Self> {
        Self::with_prefix(threads, "spark-loop")
    }

    /// 同 [`new`](Self::new)，工作线程命名为 `{prefix}-{index}`。
    pub fn with_prefix(threads: usize, prefix: &str) -> io::Result<Self> {
        let threads = match threads {
            0 => thread::available_parallelism().map_or(1, NonZeroUsize::get),
            n => n,
        };
        let mut loops = Vec::with_capacity(threads);
        for index in 0..threads {
            match SingleThreadEventLoop::spawn(format!("{prefix}-{index}")) {
                Ok(event_loop) => loops.push(Arc::new(event_loop)),
                Err(error) => {
                    for started in &loops {
                        started.shutdown();
                    }
                    return Err(error);
                }
            }
        }
        debug!(threads, prefix, "event loop group started");
        Ok(Self {
            loops,
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    /// 依次关闭所有事件循环并等待其退出。
    pub fn shutdown(&self) {
        for event_loop in &self.loops {
            event_loop.shutdown();
        }
    }
}

impl EventLoopGroup for MultiThreadEventLoopGroup {
    fn next(&self) -> Arc<dyn EventLoop> {
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.loops.len();
        self.loops[index].clone()
    }

    fn describe(&self) -> Cow<'static, str> {
        Cow::Owned(format!("MultiThreadEventLoopGroup({})", self.loops.len()))
    }
}
