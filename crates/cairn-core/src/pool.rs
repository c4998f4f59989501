use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Reusable chunk-buffer pool, passed explicitly to the engines.
///
/// Backup reads every chunk through one of these buffers; with 100 MiB
/// default chunks the allocation is worth reusing across files. The pool
/// never blocks: checkout allocates when empty, checkin drops buffers
/// beyond the retention bound.
pub struct BufferPool {
    free: Mutex<VecDeque<Vec<u8>>>,
    retain: usize,
}

impl BufferPool {
    /// Pool retaining at most `retain` idle buffers.
    pub fn new(retain: usize) -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(VecDeque::new()),
            retain,
        })
    }

    pub fn checkout(self: &Arc<Self>) -> PooledBuffer {
        let buf = {
            let mut free = self.free.lock().unwrap();
            free.pop_front().unwrap_or_default()
        };
        PooledBuffer {
            buf: Some(buf),
            pool: Arc::clone(self),
        }
    }

    fn checkin(&self, mut buf: Vec<u8>) {
        buf.clear();
        let mut free = self.free.lock().unwrap();
        if free.len() < self.retain {
            free.push_back(buf);
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self {
            free: Mutex::new(VecDeque::new()),
            retain: 2,
        }
    }
}

/// RAII guard returning its buffer to the pool on drop, on success and
/// error paths alike.
pub struct PooledBuffer {
    buf: Option<Vec<u8>>,
    pool: Arc<BufferPool>,
}

impl PooledBuffer {
    pub fn as_slice(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }

    pub fn as_mut_vec(&mut self) -> &mut Vec<u8> {
        self.buf.get_or_insert_with(Vec::new)
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.checkin(buf);
        }
    }
}
