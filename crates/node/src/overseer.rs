// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Overseer: the per-app orchestrator.
//!
//! Owns the slave pool, the pending request queue and the balancer. Pool
//! and queue sit under their own mutexes; the balancer is consulted with
//! the pool lock held so its decisions match the pool it saw. Lifecycle
//! events and timers are processed by the app loop (`run`), which tests
//! drive by hand through `post` and `tick`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rmpv::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use drover_core::{codes, graph::streaming, AppName, Clock, Fault, Manifest, Profile, SlaveId};
use drover_rpc::{control, Dispatch, Session, Upstream};

use crate::balancer::{Balance, BalancerCtx, Verdict};
use crate::dispatch::{
    ChannelWatcher, ClientStreamDispatch, ControlDispatch, Handshaker, WorkerClientDispatch,
};
use crate::scheduler::Scheduler;
use crate::slave::{timer, DeathRecord, SlaveRecord, SlaveState};
use crate::spawn::{SpawnConfig, Spawner};

/// Worker app-channel messages.
pub mod worker {
    /// Opens an app channel on the worker: `invoke(event)`.
    pub const INVOKE: u32 = 0;
}

/// Lifecycle events posted onto the app loop.
#[derive(Debug)]
pub enum OverseerEvent {
    HeartbeatReceived { uuid: SlaveId },
    TerminateReceived { uuid: SlaveId, code: u32, reason: String },
    ChildExited { uuid: SlaveId, code: i32 },
    SessionClosed { uuid: SlaveId },
}

/// A request waiting for an assignable slave.
pub struct PendingRequest {
    pub event: String,
    pub tag: Option<SlaveId>,
    pub client: Upstream,
    pub dispatch: Arc<ClientStreamDispatch>,
}

fn queue_is_full() -> Fault {
    Fault::new(codes::QUEUE_IS_FULL, "the application request queue is full")
}

/// Per-app orchestrator. See the module docs.
pub struct Overseer<C: Clock> {
    name: AppName,
    manifest: Manifest,
    profile: Profile,
    clock: C,
    spawner: Box<dyn Spawner>,
    balancer: Box<dyn Balance>,
    pool: Mutex<HashMap<SlaveId, SlaveRecord>>,
    queue: Mutex<VecDeque<PendingRequest>>,
    scheduler: Mutex<Scheduler>,
    crashlog: Mutex<VecDeque<DeathRecord>>,
    events_tx: mpsc::UnboundedSender<OverseerEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<OverseerEvent>>>,
    shutdown: AtomicBool,
    cancel: CancellationToken,
}

impl<C: Clock> Overseer<C> {
    pub fn new(
        manifest: Manifest,
        profile: Profile,
        spawner: Box<dyn Spawner>,
        balancer: Box<dyn Balance>,
        clock: C,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            name: manifest.name.clone(),
            manifest,
            profile,
            clock,
            spawner,
            balancer,
            pool: Mutex::new(HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
            scheduler: Mutex::new(Scheduler::new()),
            crashlog: Mutex::new(VecDeque::new()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            shutdown: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        })
    }

    pub fn name(&self) -> &AppName {
        &self.name
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Push to the queue tail, re-checking the bound under the same lock
    /// as the push. Concurrent enqueues from different client sessions
    /// must not grow the queue past the limit between a check and a push.
    fn push_back_bounded(&self, payload: PendingRequest) -> Result<(), Fault> {
        let mut queue = self.queue.lock();
        if queue.len() >= self.profile.queue_limit {
            return Err(queue_is_full());
        }
        queue.push_back(payload);
        Ok(())
    }

    /// Return a request to the queue head after a failed assignment. If
    /// the queue filled up in the meantime the client is settled instead
    /// of breaking the bound.
    fn requeue_front(&self, payload: PendingRequest) {
        let mut queue = self.queue.lock();
        if queue.len() >= self.profile.queue_limit {
            drop(queue);
            warn!(app = %self.name, "queue filled during assignment; settling the client");
            let fault = queue_is_full();
            let _ = payload.client.send(
                streaming::ERROR,
                vec![Value::from(fault.code), Value::from(fault.reason.as_str())],
            );
            let _ = payload.client.choke();
            return;
        }
        queue.push_front(payload);
    }

    /// Accept a client request: assign it to a slave now or queue it.
    ///
    /// Returns the dispatch to install on the client's channel. Fails
    /// with `queue_is_full` before any affinity matching, uniformly for
    /// tagged and untagged requests.
    pub fn enqueue(
        self: &Arc<Self>,
        client: Upstream,
        event: String,
        tag: Option<SlaveId>,
    ) -> Result<Arc<ClientStreamDispatch>, Fault> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(Fault::new(
                codes::OVERSEER_SHUTDOWNING,
                "the application is shutting down",
            ));
        }
        if self.queue.lock().len() >= self.profile.queue_limit {
            return Err(queue_is_full());
        }

        let dispatch = Arc::new(ClientStreamDispatch::new(self.name.as_str()));
        let payload = PendingRequest {
            event,
            tag,
            client,
            dispatch: Arc::clone(&dispatch),
        };

        let mut pool = self.pool.lock();

        if let Some(tag) = payload.tag.clone() {
            trace!(app = %self.name, tag = %tag, "enqueue with slave affinity");
            if pool.contains_key(&tag) {
                let assignable = pool
                    .get(&tag)
                    .map(|rec| rec.assignable(self.profile.concurrency))
                    .unwrap_or(false);
                if assignable {
                    if let Err((payload, fault)) = self.assign_locked(&mut pool, &tag, payload) {
                        warn!(app = %self.name, uuid = %tag, fault = %fault, "assignment failed");
                        self.requeue_front(payload);
                        self.balancer.on_slave_death(&tag);
                    }
                } else {
                    self.push_back_bounded(payload)?;
                }
            } else {
                // Affinity to a slave that does not exist yet: create it.
                self.spawn_locked(&mut pool, Some(tag))?;
                self.push_back_bounded(payload)?;
            }
            return Ok(dispatch);
        }

        let verdict = {
            let ctx = BalancerCtx {
                pool: &pool,
                queue_len: self.queue.lock().len(),
                profile: &self.profile,
            };
            self.balancer.on_request(&ctx, &payload.event, None)
        };

        match verdict {
            Verdict::Assign(uuid) => {
                trace!(app = %self.name, uuid = %uuid, "assigning request");
                if let Err((payload, fault)) = self.assign_locked(&mut pool, &uuid, payload) {
                    warn!(app = %self.name, uuid = %uuid, fault = %fault, "assignment failed");
                    self.requeue_front(payload);
                    self.balancer.on_slave_death(&uuid);
                }
            }
            Verdict::Spawn => {
                trace!(app = %self.name, "no slaves; spawning one and queueing");
                self.spawn_locked(&mut pool, None)?;
                self.push_back_bounded(payload)?;
            }
            Verdict::Queue => {
                trace!(app = %self.name, "all slaves are busy; queueing");
                self.push_back_bounded(payload)?;
                let grow = {
                    let ctx = BalancerCtx {
                        pool: &pool,
                        queue_len: self.queue.lock().len(),
                        profile: &self.profile,
                    };
                    self.balancer.on_queue(&ctx)
                };
                for _ in 0..grow {
                    if let Err(fault) = self.spawn_locked(&mut pool, None) {
                        warn!(app = %self.name, fault = %fault, "pool growth stopped");
                        break;
                    }
                }
            }
        }

        Ok(dispatch)
    }

    /// Dispatch for a freshly-accepted worker socket.
    pub fn handshaker(self: &Arc<Self>) -> Arc<Handshaker> {
        let overseer = Arc::clone(self);
        Arc::new(Handshaker::new(self.name.as_str(), move |uuid, session| {
            overseer.activate(uuid, session)
        }))
    }

    /// Match a handshake to its pool entry and activate the slave.
    fn activate(
        self: &Arc<Self>,
        uuid: SlaveId,
        session: Arc<Session>,
    ) -> Result<Arc<dyn Dispatch>, Fault> {
        let control_dispatch: Arc<dyn Dispatch> = {
            let mut pool = self.pool.lock();
            let rec = pool.get_mut(&uuid).ok_or_else(|| {
                Fault::new(codes::INVALID_STATE, "handshake from an unexpected slave")
            })?;
            if rec.state != SlaveState::Spawning {
                return Err(Fault::new(
                    codes::INVALID_STATE,
                    format!("handshake while {}", rec.state.name()),
                ));
            }
            rec.state = SlaveState::Handshaking;
            debug!(app = %self.name, uuid = %uuid, "handshake matched a pool entry");
            rec.session = Some(Arc::clone(&session));
            rec.state = SlaveState::Active;
            rec.last_heartbeat_at = Some(self.clock.now());

            let mut scheduler = self.scheduler.lock();
            let now = self.clock.now();
            scheduler.cancel_timer(&timer::startup(&uuid));
            scheduler.set_timer(
                timer::heartbeat(&uuid),
                self.profile.heartbeat_timeout(),
                now,
            );
            if rec.load == 0 {
                scheduler.set_timer(timer::idle(&uuid), self.profile.idle_timeout(), now);
            }

            Arc::new(ControlDispatch::new(
                self.name.as_str(),
                uuid.clone(),
                self.events_tx.clone(),
            ))
        };

        info!(app = %self.name, uuid = %uuid, "slave activated");
        self.balancer.on_slave_spawn(&uuid);

        // The control channel going away without a terminate is an IPC
        // failure; the loop sorts out which.
        let events = self.events_tx.clone();
        let watch_uuid = uuid.clone();
        let closed = session.closed();
        tokio::spawn(async move {
            closed.await;
            let _ = events.send(OverseerEvent::SessionClosed { uuid: watch_uuid });
        });

        self.purge();
        Ok(control_dispatch)
    }

    /// Enlarge the pool by one slave.
    pub fn spawn(self: &Arc<Self>) -> Result<SlaveId, Fault> {
        let mut pool = self.pool.lock();
        self.spawn_locked(&mut pool, None)
    }

    fn spawn_locked(
        &self,
        pool: &mut HashMap<SlaveId, SlaveRecord>,
        uuid: Option<SlaveId>,
    ) -> Result<SlaveId, Fault> {
        if pool.len() >= self.profile.pool_limit {
            return Err(Fault::new(codes::POOL_IS_FULL, "the slave pool is full"));
        }
        let uuid = uuid.unwrap_or_else(SlaveId::generate);
        info!(app = %self.name, uuid = %uuid, pool = pool.len() + 1, "enlarging the slave pool");

        let config = SpawnConfig {
            app: self.name.clone(),
            uuid: uuid.clone(),
            executable: self.manifest.executable.clone(),
            args: self.manifest.args.clone(),
            env: self.manifest.env.clone(),
            endpoint: self.manifest.endpoint.clone(),
        };
        let events = self.events_tx.clone();
        let exited = uuid.clone();
        let handle = self
            .spawner
            .spawn(
                config,
                Box::new(move |code| {
                    let _ = events.send(OverseerEvent::ChildExited { uuid: exited, code });
                }),
            )
            .map_err(|err| Fault::new(codes::RESOURCE_ERROR, err.to_string()))?;

        // The entry goes in only after the spawner accepted the job.
        pool.insert(
            uuid.clone(),
            SlaveRecord::new(uuid.clone(), self.clock.now(), handle),
        );
        self.scheduler.lock().set_timer(
            timer::startup(&uuid),
            self.profile.startup_timeout(),
            self.clock.now(),
        );
        Ok(uuid)
    }

    /// Wind a slave down. Graceful sends `terminate` and waits; force
    /// closes the session and kills the child outright.
    pub fn despawn(self: &Arc<Self>, uuid: &SlaveId, graceful: bool) -> Result<(), Fault> {
        self.despawn_inner(uuid, graceful, Fault::new(codes::SLAVE_IDLE, "despawn requested"))
    }

    fn despawn_inner(
        self: &Arc<Self>,
        uuid: &SlaveId,
        graceful: bool,
        reason: Fault,
    ) -> Result<(), Fault> {
        let mut pool = self.pool.lock();
        let rec = pool
            .get_mut(uuid)
            .ok_or_else(|| Fault::new(codes::INVALID_STATE, "no such slave"))?;
        if rec.state == SlaveState::Terminating {
            return Ok(());
        }
        debug!(app = %self.name, uuid = %uuid, graceful, "despawning slave");
        rec.state = SlaveState::Terminating;
        rec.termination_reason = Some(reason.clone());

        {
            // The idle and termination timers are mutually exclusive.
            let mut scheduler = self.scheduler.lock();
            scheduler.cancel_timer(&timer::idle(uuid));
            scheduler.cancel_timer(&timer::heartbeat(uuid));
            scheduler.set_timer(
                timer::terminate(uuid),
                self.profile.termination_timeout(),
                self.clock.now(),
            );
        }

        if graceful {
            if let Some(session) = &rec.session {
                let sent = session.send_control(
                    control::TERMINATE,
                    vec![Value::from(reason.code), Value::from(reason.reason.as_str())],
                );
                if sent.is_ok() {
                    return Ok(());
                }
            }
            // No way to ask nicely; fall through to force.
        }
        if let Some(session) = &rec.session {
            session.close();
        }
        if let Some(handle) = &rec.handle {
            handle.kill();
        }
        Ok(())
    }

    /// Graceful teardown of the whole app: despawn everything, refuse new
    /// requests.
    pub fn shutdown(self: &Arc<Self>) {
        self.shutdown.store(true, Ordering::SeqCst);
        let uuids: Vec<SlaveId> = self.pool.lock().keys().cloned().collect();
        for uuid in uuids {
            let _ = self.despawn_inner(
                &uuid,
                true,
                Fault::new(codes::OVERSEER_SHUTDOWNING, "the application is shutting down"),
            );
        }
        let drained: Vec<PendingRequest> = self.queue.lock().drain(..).collect();
        for payload in drained {
            let _ = payload.client.send(
                streaming::ERROR,
                vec![
                    Value::from(codes::OVERSEER_SHUTDOWNING),
                    Value::from("the application is shutting down"),
                ],
            );
            let _ = payload.client.choke();
        }
        self.cancel.cancel();
    }

    // --- Assignment ---

    #[allow(clippy::result_large_err)]
    fn assign_locked(
        self: &Arc<Self>,
        pool: &mut HashMap<SlaveId, SlaveRecord>,
        uuid: &SlaveId,
        payload: PendingRequest,
    ) -> Result<(), (PendingRequest, Fault)> {
        let rec = match pool.get_mut(uuid) {
            Some(rec) => rec,
            None => {
                return Err((
                    payload,
                    Fault::new(codes::INVALID_STATE, "slave vanished before assignment"),
                ))
            }
        };
        if !rec.assignable(self.profile.concurrency) {
            return Err((
                payload,
                Fault::new(codes::INVALID_STATE, "slave is not assignable"),
            ));
        }
        let session = match &rec.session {
            Some(session) => Arc::clone(session),
            None => {
                return Err((
                    payload,
                    Fault::new(codes::INVALID_STATE, "slave has no session"),
                ))
            }
        };

        let watcher = ChannelWatcher::new();
        let worker_dispatch = Arc::new(WorkerClientDispatch::new(
            self.name.as_str(),
            payload.client.clone(),
            Arc::clone(&watcher),
        ));
        let stream = session.open_channel(Some(worker_dispatch));
        let channel = stream.channel();

        {
            // The close races hold no locks: completion is posted onto a
            // fresh task, never run under the pool lock of a caller.
            let overseer = Arc::downgrade(self);
            let finished_uuid = uuid.clone();
            watcher.set_callback(Box::new(move || {
                if let Some(overseer) = overseer.upgrade() {
                    tokio::spawn(async move {
                        overseer.on_channel_closed(&finished_uuid, channel);
                    });
                }
            }));
        }

        // Load goes up before the first frame leaves.
        rec.load += 1;
        trace!(app = %self.name, uuid = %uuid, load = rec.load, channel, "channel starting");
        if let Err(fault) = stream.send(worker::INVOKE, vec![Value::from(payload.event.as_str())])
        {
            rec.load -= 1;
            return Err((payload, fault));
        }
        rec.active_channels.insert(channel);
        rec.assignments.insert(channel, payload.client.clone());
        self.balancer.on_channel_started(uuid, channel);
        self.scheduler.lock().cancel_timer(&timer::idle(uuid));

        let tx_watcher = Arc::clone(&watcher);
        if let Err(fault) = payload
            .dispatch
            .attach(stream, Box::new(move || tx_watcher.close(ChannelWatcher::TX)))
        {
            warn!(app = %self.name, uuid = %uuid, fault = %fault, "stream attach failed");
        }
        Ok(())
    }

    fn on_channel_closed(self: &Arc<Self>, uuid: &SlaveId, channel: u64) {
        {
            let mut pool = self.pool.lock();
            if let Some(rec) = pool.get_mut(uuid) {
                rec.load = rec.load.saturating_sub(1);
                rec.active_channels.remove(&channel);
                rec.assignments.remove(&channel);
                trace!(app = %self.name, uuid = %uuid, load = rec.load, channel, "channel finished");
                self.balancer.on_channel_finished(uuid, channel);
                if rec.load == 0 && rec.state == SlaveState::Active {
                    self.scheduler.lock().set_timer(
                        timer::idle(uuid),
                        self.profile.idle_timeout(),
                        self.clock.now(),
                    );
                }
            }
        }
        self.purge();
    }

    /// Drain the queue while someone can take work, preserving order.
    pub fn purge(self: &Arc<Self>) {
        loop {
            let mut pool = self.pool.lock();
            let mut queue = self.queue.lock();
            let target = match queue.front() {
                None => break,
                Some(front) => match &front.tag {
                    Some(tag) => {
                        let assignable = pool
                            .get(tag)
                            .map(|rec| rec.assignable(self.profile.concurrency))
                            .unwrap_or(false);
                        if assignable {
                            tag.clone()
                        } else {
                            break;
                        }
                    }
                    None => {
                        let ctx = BalancerCtx {
                            pool: &pool,
                            queue_len: queue.len(),
                            profile: &self.profile,
                        };
                        match self.balancer.on_request(&ctx, &front.event, None) {
                            Verdict::Assign(uuid) => uuid,
                            _ => break,
                        }
                    }
                },
            };
            let payload = match queue.pop_front() {
                Some(payload) => payload,
                None => break,
            };
            drop(queue);
            match self.assign_locked(&mut pool, &target, payload) {
                Ok(()) => {
                    drop(pool);
                    continue;
                }
                Err((payload, fault)) => {
                    warn!(app = %self.name, uuid = %target, fault = %fault, "purge assignment failed");
                    // Strong guarantee: the request goes back where it was.
                    self.requeue_front(payload);
                    self.balancer.on_slave_death(&target);
                    break;
                }
            }
        }
    }

    // --- Lifecycle events and timers ---

    /// Post a lifecycle event onto the app loop.
    pub fn post(&self, event: OverseerEvent) {
        let _ = self.events_tx.send(event);
    }

    /// Process one lifecycle event.
    pub fn handle_event(self: &Arc<Self>, event: OverseerEvent) {
        match event {
            OverseerEvent::HeartbeatReceived { uuid } => {
                let mut pool = self.pool.lock();
                if let Some(rec) = pool.get_mut(&uuid) {
                    if rec.state == SlaveState::Active {
                        rec.last_heartbeat_at = Some(self.clock.now());
                        self.scheduler.lock().set_timer(
                            timer::heartbeat(&uuid),
                            self.profile.heartbeat_timeout(),
                            self.clock.now(),
                        );
                        trace!(app = %self.name, uuid = %uuid, "heartbeat");
                    }
                }
            }
            OverseerEvent::TerminateReceived { uuid, code, reason } => {
                let expected = self.termination_reason(&uuid);
                match expected {
                    Some(fault) => self.slave_dead(&uuid, fault),
                    None => self.slave_dead(
                        &uuid,
                        Fault::new(
                            codes::COMMITTED_SUICIDE,
                            format!("worker terminated itself: [{}] {}", code, reason),
                        ),
                    ),
                }
            }
            OverseerEvent::ChildExited { uuid, code } => {
                if !self.pool.lock().contains_key(&uuid) {
                    return;
                }
                match self.termination_reason(&uuid) {
                    Some(fault) => self.slave_dead(&uuid, fault),
                    None if code != 0 => self.slave_dead(
                        &uuid,
                        Fault::new(
                            codes::CONTROL_IPC_ERROR,
                            format!("worker exited with code {}", code),
                        ),
                    ),
                    None => self.slave_dead(
                        &uuid,
                        Fault::new(codes::COMMITTED_SUICIDE, "worker exited cleanly"),
                    ),
                }
            }
            OverseerEvent::SessionClosed { uuid } => {
                if !self.pool.lock().contains_key(&uuid) {
                    return;
                }
                match self.termination_reason(&uuid) {
                    Some(fault) => self.slave_dead(&uuid, fault),
                    None => self.slave_dead(
                        &uuid,
                        Fault::new(codes::CONTROL_IPC_ERROR, "control channel closed"),
                    ),
                }
            }
        }
    }

    fn termination_reason(&self, uuid: &SlaveId) -> Option<Fault> {
        let pool = self.pool.lock();
        let rec = pool.get(uuid)?;
        if rec.state == SlaveState::Terminating {
            Some(
                rec.termination_reason
                    .clone()
                    .unwrap_or_else(|| Fault::new(codes::SLAVE_IDLE, "terminated")),
            )
        } else {
            None
        }
    }

    /// Drain pending lifecycle events, then process due timers. The run
    /// loop does this continuously; tests call it by hand.
    pub fn step(self: &Arc<Self>) {
        let events: Vec<OverseerEvent> = {
            let mut guard = self.events_rx.lock();
            match guard.as_mut() {
                Some(events) => {
                    let mut drained = Vec::new();
                    while let Ok(event) = events.try_recv() {
                        drained.push(event);
                    }
                    drained
                }
                None => Vec::new(),
            }
        };
        for event in events {
            self.handle_event(event);
        }
        self.tick();
    }

    /// Process all due timers.
    pub fn tick(self: &Arc<Self>) {
        let fired = self.scheduler.lock().fired_timers(self.clock.now());
        for id in fired {
            self.handle_timer(&id);
        }
    }

    fn handle_timer(self: &Arc<Self>, id: &str) {
        let Some((kind, uuid)) = timer::parse(id) else {
            warn!(app = %self.name, id, "unparseable timer id");
            return;
        };
        // The timer may race a departed or transitioned slave; state is
        // re-checked here.
        let state = self.pool.lock().get(&uuid).map(|rec| (rec.state, rec.load));
        let Some((state, load)) = state else { return };

        match kind {
            "startup" => match state {
                SlaveState::Spawning => self.slave_dead(
                    &uuid,
                    Fault::new(codes::SPAWN_TIMEOUT, "worker did not handshake in time"),
                ),
                SlaveState::Handshaking => self.slave_dead(
                    &uuid,
                    Fault::new(codes::ACTIVATE_TIMEOUT, "worker did not activate in time"),
                ),
                _ => {}
            },
            "heartbeat" => {
                if state == SlaveState::Active {
                    self.slave_dead(
                        &uuid,
                        Fault::new(codes::HEARTBEAT_TIMEOUT, "worker heartbeat lost"),
                    );
                }
            }
            "idle" => {
                if state == SlaveState::Active && load == 0 {
                    let _ = self.despawn_inner(
                        &uuid,
                        true,
                        Fault::new(codes::SLAVE_IDLE, "worker was idle for too long"),
                    );
                }
            }
            "terminate" => {
                if state == SlaveState::Terminating {
                    self.slave_dead(
                        &uuid,
                        Fault::new(codes::TERMINATE_TIMEOUT, "worker ignored terminate"),
                    );
                }
            }
            other => warn!(app = %self.name, kind = other, "unknown timer kind"),
        }
    }

    /// Remove a slave and settle everything it owes. Invoked at most once
    /// per slave; removal from the pool is the guard.
    fn slave_dead(self: &Arc<Self>, uuid: &SlaveId, fault: Fault) {
        let removed = self.pool.lock().remove(uuid);
        {
            let mut scheduler = self.scheduler.lock();
            for id in timer::all(uuid) {
                scheduler.cancel_timer(&id);
            }
        }
        let Some(rec) = removed else { return };

        warn!(app = %self.name, uuid = %uuid, fault = %fault, "slave is dead");

        // Clients with channels still open on this slave get told.
        for (channel, client) in rec.assignments {
            let gone = Fault::slave_gone();
            let _ = client.send(
                streaming::ERROR,
                vec![Value::from(gone.code), Value::from(gone.reason.as_str())],
            );
            let _ = client.choke();
            trace!(app = %self.name, uuid = %uuid, channel, "client channel settled");
        }
        if let Some(session) = rec.session {
            session.close();
        }
        if let Some(handle) = rec.handle {
            handle.kill();
        }

        {
            let mut crashlog = self.crashlog.lock();
            crashlog.push_front(DeathRecord {
                uuid: uuid.clone(),
                at: self.clock.now(),
                fault,
            });
            crashlog.truncate(self.profile.crashlog_limit);
        }
        self.balancer.on_slave_death(uuid);
    }

    // --- App loop ---

    /// Run the app loop until shutdown. Events and due timers are
    /// processed sequentially.
    pub async fn run(self: Arc<Self>) {
        let mut events = match self.events_rx.lock().take() {
            Some(events) => events,
            None => return,
        };
        loop {
            let sleep_for = {
                let scheduler = self.scheduler.lock();
                scheduler
                    .next_deadline()
                    .map(|deadline| deadline.saturating_duration_since(self.clock.now()))
                    .unwrap_or(Duration::from_millis(500))
                    .min(Duration::from_millis(500))
            };
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                _ = tokio::time::sleep(sleep_for) => {}
            }
            self.tick();
        }
        debug!(app = %self.name, "app loop stopped");
    }

    // --- Introspection ---

    /// Dynamic info object served by the node's `info` call.
    pub fn info(&self) -> Value {
        let pool = self.pool.lock();
        let mut states: HashMap<&'static str, u64> = HashMap::new();
        let mut load_total: u64 = 0;
        for rec in pool.values() {
            *states.entry(rec.state.name()).or_insert(0) += 1;
            load_total += u64::from(rec.load);
        }
        let states: Vec<(Value, Value)> = states
            .into_iter()
            .map(|(name, count)| (Value::from(name), Value::from(count)))
            .collect();
        let crashlog: Vec<Value> = self
            .crashlog
            .lock()
            .iter()
            .map(|death| {
                Value::Array(vec![
                    Value::from(death.uuid.as_str()),
                    Value::from(death.fault.code),
                    Value::from(death.fault.reason.as_str()),
                ])
            })
            .collect();

        Value::Map(vec![
            (Value::from("app"), Value::from(self.name.as_str())),
            (Value::from("pool"), Value::from(pool.len() as u64)),
            (
                Value::from("pool_limit"),
                Value::from(self.profile.pool_limit as u64),
            ),
            (Value::from("load"), Value::from(load_total)),
            (
                Value::from("queue"),
                Value::from(self.queue.lock().len() as u64),
            ),
            (
                Value::from("queue_limit"),
                Value::from(self.profile.queue_limit as u64),
            ),
            (Value::from("states"), Value::Map(states)),
            (Value::from("crashlog"), Value::Array(crashlog)),
        ])
    }

    // --- Test and diagnostic accessors ---

    pub fn pool_size(&self) -> usize {
        self.pool.lock().len()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn slave_state(&self, uuid: &SlaveId) -> Option<SlaveState> {
        self.pool.lock().get(uuid).map(|rec| rec.state)
    }

    pub fn slave_load(&self, uuid: &SlaveId) -> Option<u32> {
        self.pool.lock().get(uuid).map(|rec| rec.load)
    }

    /// Whether the slave's worker session is still up.
    pub fn slave_session_alive(&self, uuid: &SlaveId) -> Option<bool> {
        self.pool
            .lock()
            .get(uuid)
            .map(|rec| rec.session.as_ref().map(|s| !s.is_closed()).unwrap_or(false))
    }

    pub fn slave_uuids(&self) -> Vec<SlaveId> {
        self.pool.lock().keys().cloned().collect()
    }

    pub fn crashlog(&self) -> Vec<DeathRecord> {
        self.crashlog.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
#[path = "overseer_tests.rs"]
mod tests;
