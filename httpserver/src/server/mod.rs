// Copyright 2024 tison <wander4096@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The acceptor loop, worker pool, and request dispatcher.
//!
//! One thread owns the listening socket and does nothing but accept
//! connections and push them onto a bounded [`Queue`] sized to the worker
//! pool, so the backlog of accepted-but-unhandled connections is bounded.
//! Each worker pops a connection, parses the request, interns the per-path
//! lock through the [`LockRegistry`], holds it in read mode for `GET` and
//! write mode for `PUT` across the handler and the audit record, and
//! finally answers with a canned response when the handler did not stream
//! its own.
//!
//! Shutdown is cooperative: a [`ShutdownHandle`] sets an atomic flag and
//! wakes the acceptor with a loopback connection; the acceptor stops
//! accepting and hands one poison job to every worker, and [`Server::run`]
//! returns once all workers have drained.
//!
//! [`Queue`]: crate::queue::Queue
//! [`LockRegistry`]: crate::registry::LockRegistry

use std::io;
use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::net::Ipv6Addr;
use std::net::SocketAddr;
use std::net::TcpListener;
use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use crate::audit::AuditLog;
use crate::handler;
use crate::http;
use crate::http::Method;
use crate::http::Status;
use crate::queue::Queue;
use crate::registry::LockRegistry;
use crate::rwlock::Policy;


/// Settings for a [`Server`].
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address the listening socket binds to.
    pub addr: SocketAddr,
    /// Number of worker threads; also the connection queue capacity and
    /// the lock registry size.
    pub threads: usize,
    /// Fairness policy of the per-path locks.
    pub policy: Policy,
    /// Directory that request paths resolve under.
    pub root: PathBuf,
}

impl ServerConfig {
    /// A configuration with the default pool size (4 workers),
    /// writer-priority path locks, and the current directory as the file
    /// root.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            threads: 4,
            policy: Policy::WriterPriority,
            root: PathBuf::from("."),
        }
    }
}

enum Job {
    Serve(TcpStream),
    Shutdown,
}

/// The file server: a bound listening socket plus the state its acceptor
/// and workers share.
///
/// See the [module level documentation](self) for more.
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    audit: AuditLog,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    /// Binds the listening socket.
    ///
    /// # Panics
    ///
    /// Panics if `config.threads` is zero; callers validate pool sizes
    /// before they get here.
    pub fn bind(config: ServerConfig, audit: AuditLog) -> io::Result<Self> {
        assert!(config.threads > 0, "worker pool must have at least one thread");
        let listener = TcpListener::bind(config.addr)?;
        Ok(Self {
            listener,
            config,
            audit,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The address the listener actually bound to (useful with port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Returns a handle that can stop this server from another thread.
    pub fn shutdown_handle(&self) -> io::Result<ShutdownHandle> {
        let mut addr = self.local_addr()?;
        // The wake-up connection must target a routable address even when
        // the listener is bound to the wildcard.
        match addr.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => addr.set_ip(IpAddr::V4(Ipv4Addr::LOCALHOST)),
            IpAddr::V6(ip) if ip.is_unspecified() => addr.set_ip(IpAddr::V6(Ipv6Addr::LOCALHOST)),
            _ => {}
        }
        Ok(ShutdownHandle {
            flag: self.shutdown.clone(),
            addr,
        })
    }

    /// Accepts and serves connections until a [`ShutdownHandle`] fires.
    ///
    /// The calling thread becomes the acceptor; `threads` workers are
    /// spawned for the lifetime of the call and joined before it returns.
    pub fn run(&self) {
        let queue = Queue::new(self.config.threads);
        let registry = LockRegistry::new(self.config.threads, self.config.policy);
        thread::scope(|scope| {
            for worker in 0..self.config.threads {
                let queue = &queue;
                let registry = &registry;
                scope.spawn(move || self.worker_loop(worker, queue, registry));
            }
            self.accept_loop(&queue);
        });
        log::info!("all workers drained");
    }

    fn accept_loop(&self, queue: &Queue<Job>) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if self.shutdown.load(Ordering::SeqCst) {
                        // Either the wake-up connection or a client that
                        // raced the flag; both are dropped unserved.
                        break;
                    }
                    log::debug!("accepted connection from {peer}");
                    queue.push(Job::Serve(stream));
                }
                Err(err) => {
                    if self.shutdown.load(Ordering::SeqCst) {
                        break;
                    }
                    log::warn!("accept failed: {err}");
                }
            }
        }
        log::info!("shutting down, draining {} workers", self.config.threads);
        for _ in 0..self.config.threads {
            queue.push(Job::Shutdown);
        }
    }

    fn worker_loop(&self, worker: usize, queue: &Queue<Job>, registry: &Arc<LockRegistry>) {
        loop {
            match queue.pop() {
                Job::Shutdown => break,
                Job::Serve(stream) => self.serve(worker, stream, registry),
            }
        }
        log::debug!("worker {worker} exiting");
    }

    /// Serves one connection end to end; the stream is closed on return.
    fn serve(&self, worker: usize, mut stream: TcpStream, registry: &Arc<LockRegistry>) {
        let request = match http::read_request(&mut stream) {
            Ok(request) => request,
            Err(err) => {
                log::debug!("worker {worker}: rejecting request: {err}");
                if let Some(status) = err.status() {
                    let _ = http::write_canned(&mut stream, status);
                }
                return;
            }
        };
        let Some(request_id) = request.request_id() else {
            log::debug!("worker {worker}: request without {}", http::REQUEST_ID_HEADER);
            let _ = http::write_canned(&mut stream, Status::BadRequest);
            return;
        };
        let request_id = request_id.to_owned();
        log::debug!(
            "worker {worker}: {} {} (request id {request_id})",
            request.method(),
            request.uri()
        );

        let entry = registry.acquire(request.uri());
        let outcome = match request.method() {
            Method::Get => {
                let guard = entry.lock().read();
                let outcome = handler::get(&self.config.root, request.uri(), &mut stream);
                // The audit record goes out while the lock is still held, so
                // audit order matches the order in which conflicting
                // requests observed the filesystem.
                self.audit.record(Method::Get, request.uri(), outcome.status, &request_id);
                drop(guard);
                outcome
            }
            Method::Put => {
                let guard = entry.lock().write();
                let outcome = handler::put(&self.config.root, &request, &mut stream);
                self.audit.record(Method::Put, request.uri(), outcome.status, &request_id);
                drop(guard);
                outcome
            }
        };
        drop(entry);

        if !outcome.responded {
            if let Err(err) = http::write_canned(&mut stream, outcome.status) {
                log::debug!("worker {worker}: canned response failed: {err}");
            }
        }
    }
}

/// Stops a running [`Server`] from another thread (or a signal watcher).
///
/// This structure is created by the [`shutdown_handle`] method on
/// [`Server`].
///
/// [`shutdown_handle`]: Server::shutdown_handle
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    addr: SocketAddr,
}

impl ShutdownHandle {
    /// Requests shutdown: raises the flag, then wakes the acceptor out of
    /// `accept` with a throwaway loopback connection. Idempotent.
    pub fn shutdown(&self) {
        if self.flag.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(err) = TcpStream::connect(self.addr) {
            // The acceptor may have exited already, e.g. when the listener
            // failed; nothing left to wake.
            log::debug!("shutdown wake-up connect failed: {err}");
        }
    }
}
