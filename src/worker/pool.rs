use std::io;
use std::sync::Arc;

use mio::net::TcpStream;

use crate::server::{Dispatch, Limits};
use super::Worker;


/// Self-scaling set of workers
///
/// Connections go to the worker with the most free slots, ties broken by
/// creation order. The pool grows up to `max_workers` when every worker is
/// full and retires idle workers down to `min_workers` after each dispatch.
///
/// All methods take `&mut self`: the pool is driven by a single accepting
/// thread. Multiple acceptors would need to put the pool behind a mutex.
pub struct WorkerPool {
    workers: Vec<Worker>,
    min_workers: usize,
    max_workers: usize,
    capacity: usize,
    limits: Limits,
    dispatch: Arc<Dispatch>,
    next_id: usize,
}

impl WorkerPool {
    /// Creates a pool and starts `min_workers` workers
    pub fn new(min_workers: usize, max_workers: usize, capacity: usize,
        limits: Limits, dispatch: Arc<Dispatch>)
        -> io::Result<WorkerPool>
    {
        if min_workers == 0 || min_workers > max_workers {
            return Err(io::Error::new(io::ErrorKind::InvalidInput,
                "pool size must satisfy 0 < min_workers <= max_workers"));
        }
        let mut pool = WorkerPool {
            workers: Vec::with_capacity(max_workers),
            min_workers: min_workers,
            max_workers: max_workers,
            capacity: capacity,
            limits: limits,
            dispatch: dispatch,
            next_id: 0,
        };
        for _ in 0..min_workers {
            pool.spawn()?;
        }
        info!("Started {} workers, {} connections each",
              min_workers, capacity);
        Ok(pool)
    }
    pub fn len(&self) -> usize {
        self.workers.len()
    }
    /// Total free slots over all workers
    pub fn free_slots(&self) -> usize {
        self.workers.iter().map(|w| w.free_slots()).sum()
    }
    /// Hands the connection to a worker
    ///
    /// Returns false if every worker is full and the pool can't grow, in
    /// which case the connection is closed without a response.
    pub fn dispatch(&mut self, stream: TcpStream) -> bool {
        self.remove_dead();
        let accepted = match self.admit(stream) {
            Ok(()) => true,
            Err(stream) => {
                warn!("All {} workers are full, dropping connection",
                      self.workers.len());
                drop(stream);
                false
            }
        };
        self.compact();
        accepted
    }
    /// Stops every worker and waits for their threads
    pub fn shutdown(mut self) {
        let workers = self.workers.drain(..).collect::<Vec<_>>();
        for worker in &workers {
            worker.stop();
        }
        for worker in workers {
            worker.shutdown();
        }
    }
    fn admit(&mut self, stream: TcpStream) -> Result<(), TcpStream> {
        let stream = match self.least_loaded() {
            Some(idx) => match self.workers[idx].handle(stream) {
                Ok(()) => return Ok(()),
                Err(stream) => stream,
            },
            None => stream,
        };
        if self.workers.len() >= self.max_workers {
            return Err(stream);
        }
        match self.spawn() {
            Ok(idx) => {
                info!("All workers are full, started worker {}, {} total",
                      self.workers[idx].id(), self.workers.len());
                self.workers[idx].handle(stream)
            }
            Err(e) => {
                error!("Can't start worker: {}", e);
                Err(stream)
            }
        }
    }
    /// Retires idle workers while the pool is above its minimum
    ///
    /// An idle worker has the largest possible number of free slots, so if
    /// the top ranked worker is busy no other worker can be idle.
    fn compact(&mut self) {
        while self.workers.len() > self.min_workers {
            let idx = match self.least_loaded() {
                Some(idx) => idx,
                None => break,
            };
            if !self.workers[idx].is_idle() {
                break;
            }
            let worker = self.workers.remove(idx);
            info!("Retiring idle worker {}, {} left",
                  worker.id(), self.workers.len());
            // The thread exits on its own, the acceptor never waits for it
            worker.stop();
            drop(worker);
        }
    }
    /// Replaces workers whose event loop failed
    fn remove_dead(&mut self) {
        let before = self.workers.len();
        self.workers.retain(|w| !w.is_shut_down());
        if self.workers.len() == before {
            return;
        }
        warn!("Removed {} failed workers", before - self.workers.len());
        while self.workers.len() < self.min_workers {
            if let Err(e) = self.spawn() {
                error!("Can't start worker: {}", e);
                break;
            }
        }
    }
    /// Index of the worker with the most free slots, oldest first on ties
    fn least_loaded(&self) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (idx, worker) in self.workers.iter().enumerate() {
            let free = worker.free_slots();
            match best {
                Some((_, best_free)) if best_free >= free => {}
                _ => best = Some((idx, free)),
            }
        }
        best.map(|(idx, _)| idx)
    }
    fn spawn(&mut self) -> io::Result<usize> {
        let worker = Worker::spawn(self.next_id, self.capacity,
            self.limits.clone(), self.dispatch.clone())?;
        self.next_id += 1;
        self.workers.push(worker);
        Ok(self.workers.len() - 1)
    }
}

#[cfg(test)]
mod test {
    use std::io::Read;
    use std::sync::Arc;

    use crate::worker::test::{Site, wait_for};
    use super::WorkerPool;

    fn pool(site: &Site, min: usize, max: usize, capacity: usize)
        -> WorkerPool
    {
        WorkerPool::new(min, max, capacity, site.limits(),
                        site.dispatch.clone()).unwrap()
    }

    fn ids(pool: &WorkerPool) -> Vec<usize> {
        pool.workers.iter().map(|w| w.id()).collect()
    }

    #[test]
    fn starts_minimum() {
        let site = Site::new();
        let pool = pool(&site, 3, 5, 2);
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.free_slots(), 6);
        pool.shutdown();
    }

    #[test]
    fn invalid_sizes() {
        let site = Site::new();
        assert!(WorkerPool::new(0, 1, 1, site.limits(),
                                site.dispatch.clone()).is_err());
        assert!(WorkerPool::new(3, 2, 1, site.limits(),
                                site.dispatch.clone()).is_err());
    }

    #[test]
    fn least_loaded_wins_oldest_on_tie() {
        let site = Site::new();
        let mut pool = pool(&site, 2, 2, 2);
        let mut clients = Vec::new();
        for _ in 0..3 {
            let (client, server) = site.connect();
            assert!(pool.dispatch(server));
            clients.push(client);
        }
        let free: Vec<_> = pool.workers.iter()
            .map(|w| w.free_slots()).collect();
        assert_eq!(free, vec![0, 1]);
        drop(clients);
        pool.shutdown();
    }

    #[test]
    fn grow_reject_and_compact() {
        let site = Site::new();
        let mut pool = pool(&site, 2, 4, 1);
        let mut clients = Vec::new();
        for n in 0..4 {
            let (client, server) = site.connect();
            assert!(pool.dispatch(server));
            clients.push(client);
            assert_eq!(pool.len(), if n < 2 { 2 } else { n + 1 });
        }
        assert_eq!(ids(&pool), vec![0, 1, 2, 3]);

        let (mut rejected, server) = site.connect();
        assert!(!pool.dispatch(server));
        assert_eq!(pool.len(), 4);
        let mut out = Vec::new();
        rejected.read_to_end(&mut out).unwrap();
        assert!(out.is_empty());

        drop(clients);
        wait_for(|| pool.workers.iter().all(|w| w.is_idle()));
        assert_eq!(pool.len(), 4);
        let (_client, server) = site.connect();
        assert!(pool.dispatch(server));
        assert_eq!(pool.len(), 2);
        assert_eq!(ids(&pool), vec![0, 3]);
        assert_eq!(pool.free_slots(), 1);
        // Retired threads exit by themselves and release their dispatch
        // reference: one for the site, one for the pool, one per worker
        wait_for(|| Arc::strong_count(&site.dispatch) == 4);
        pool.shutdown();
    }

    #[test]
    fn failed_worker_is_replaced() {
        let site = Site::new();
        let mut pool = pool(&site, 1, 1, 1);
        pool.workers[0].stop();
        let (_client, server) = site.connect();
        assert!(pool.dispatch(server));
        assert_eq!(ids(&pool), vec![1]);
        pool.shutdown();
    }
}
