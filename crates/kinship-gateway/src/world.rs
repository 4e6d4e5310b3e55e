//! Bridge between the async I/O pool and the single-threaded world loop.
//!
//! The world (the authoritative game/session state) may only be touched from
//! its own thread. Async code holds a [`WorldHandle`] and pushes
//! [`WorldTask`]s into a bounded queue; the [`WorldLoop`] drains a bounded
//! number of them per tick. Presence questions travel the same queue and are
//! answered through a one-shot channel.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

use kinship_common::config::WorldConfig;
use kinship_common::error::{KinshipError, KinshipResult};
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio::sync::oneshot;
use uuid::Uuid;

/// The in-world collaborator. Only ever called on the loop thread.
pub trait World: Send + 'static {
    fn is_present(&self, player: Uuid) -> bool;
    fn send_line(&mut self, player: Uuid, line: &WorldLine);
}

/// A formatted chat line plus the id of the event it renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldLine {
    pub event_id: Uuid,
    pub text: String,
}

#[derive(Debug)]
pub enum WorldTask {
    /// Send `line` to each recipient that is present in the world.
    Deliver { recipients: Vec<Uuid>, line: WorldLine },
    /// Reply with the subset of `players` present in the world.
    Presence {
        players: Vec<Uuid>,
        reply: oneshot::Sender<HashSet<Uuid>>,
    },
}

/// Cloneable sender side of the task queue.
#[derive(Debug, Clone)]
pub struct WorldHandle {
    tx: mpsc::Sender<WorldTask>,
}

impl WorldHandle {
    /// Queue a line for delivery without waiting. Returns whether it was
    /// queued; a full queue drops the line.
    pub fn deliver(&self, recipients: Vec<Uuid>, line: WorldLine) -> bool {
        if recipients.is_empty() {
            return true;
        }
        match self.tx.try_send(WorldTask::Deliver { recipients, line }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!("World task queue full, dropping in-world delivery");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!("World loop stopped, dropping in-world delivery");
                false
            }
        }
    }

    /// Which of `players` are currently in the world.
    pub async fn present(&self, players: Vec<Uuid>) -> KinshipResult<HashSet<Uuid>> {
        if players.is_empty() {
            return Ok(HashSet::new());
        }
        let (reply, answer) = oneshot::channel();
        self.tx
            .send(WorldTask::Presence { players, reply })
            .await
            .map_err(|_| KinshipError::WorldUnavailable)?;
        answer.await.map_err(|_| KinshipError::WorldUnavailable)
    }

    pub async fn is_present(&self, player: Uuid) -> KinshipResult<bool> {
        Ok(self.present(vec![player]).await?.contains(&player))
    }
}

/// Owns the world and drains the task queue.
pub struct WorldLoop<W: World> {
    world: W,
    rx: mpsc::Receiver<WorldTask>,
    max_tasks_per_tick: usize,
    tick: Duration,
}

impl<W: World> WorldLoop<W> {
    pub fn new(world: W, config: &WorldConfig) -> (Self, WorldHandle) {
        Self::with_limits(
            world,
            config.queue_capacity,
            config.max_tasks_per_tick,
            Duration::from_millis(config.tick_millis),
        )
    }

    pub fn with_limits(
        world: W,
        queue_capacity: usize,
        max_tasks_per_tick: usize,
        tick: Duration,
    ) -> (Self, WorldHandle) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let world_loop = Self {
            world,
            rx,
            max_tasks_per_tick: max_tasks_per_tick.max(1),
            tick,
        };
        (world_loop, WorldHandle { tx })
    }

    /// Run one tick. Returns the number of tasks processed, or `None` once
    /// every handle is gone and the queue is empty.
    pub fn tick(&mut self) -> Option<usize> {
        let mut processed = 0;
        while processed < self.max_tasks_per_tick {
            match self.rx.try_recv() {
                Ok(task) => {
                    self.apply(task);
                    processed += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    return (processed > 0).then_some(processed);
                }
            }
        }
        Some(processed)
    }

    fn apply(&mut self, task: WorldTask) {
        match task {
            WorldTask::Deliver { recipients, line } => {
                for player in recipients {
                    if self.world.is_present(player) {
                        self.world.send_line(player, &line);
                    }
                }
            }
            WorldTask::Presence { players, reply } => {
                let present = players
                    .into_iter()
                    .filter(|p| self.world.is_present(*p))
                    .collect();
                // The asker may have given up; nothing to do then.
                let _ = reply.send(present);
            }
        }
    }

    /// Tick until all handles are dropped.
    pub fn run(mut self) {
        tracing::info!(tick_ms = self.tick.as_millis() as u64, "World loop started");
        while self.tick().is_some() {
            std::thread::sleep(self.tick);
        }
        tracing::info!("World loop stopped");
    }

    /// Run the loop on a dedicated thread.
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("kinship-world".into())
            .spawn(move || self.run())
    }
}

/// Lines kept per player until the host collects them; older lines are
/// dropped first.
pub const INBOX_LIMIT: usize = 256;

/// Presence and received lines of a [`LocalWorld`], shareable with other threads.
#[derive(Debug, Clone, Default)]
pub struct LocalRoster {
    present: Arc<RwLock<HashSet<Uuid>>>,
    inbox: Arc<Mutex<HashMap<Uuid, VecDeque<WorldLine>>>>,
}

impl LocalRoster {
    pub fn join(&self, player: Uuid) {
        self.present
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(player);
    }

    /// Mark the player absent and drop anything they had not collected.
    pub fn leave(&self, player: Uuid) {
        self.present
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&player);
        self.inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&player);
    }

    pub fn is_present(&self, player: Uuid) -> bool {
        self.present
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&player)
    }

    /// Lines delivered to `player` and not yet taken.
    pub fn lines_for(&self, player: Uuid) -> Vec<WorldLine> {
        self.inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&player)
            .map(|lines| lines.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove and return the lines waiting for `player`, oldest first.
    pub fn take_lines(&self, player: Uuid) -> Vec<WorldLine> {
        self.inbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&player)
            .map(Vec::from)
            .unwrap_or_default()
    }

    fn record(&self, player: Uuid, line: &WorldLine) {
        let mut inbox = self.inbox.lock().unwrap_or_else(PoisonError::into_inner);
        let lines = inbox.entry(player).or_default();
        if lines.len() == INBOX_LIMIT {
            lines.pop_front();
        }
        lines.push_back(line.clone());
    }
}

/// In-process world: presence is whatever the roster says and delivered
/// lines are logged and kept in the roster's inbox.
#[derive(Debug, Clone, Default)]
pub struct LocalWorld {
    roster: LocalRoster,
}

impl LocalWorld {
    pub fn new(roster: LocalRoster) -> Self {
        Self { roster }
    }
}

impl World for LocalWorld {
    fn is_present(&self, player: Uuid) -> bool {
        self.roster.is_present(player)
    }

    fn send_line(&mut self, player: Uuid, line: &WorldLine) {
        tracing::info!(target: "kinship::world", player = %player, event = %line.event_id, "{}", line.text);
        self.roster.record(player, line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str) -> WorldLine {
        WorldLine {
            event_id: Uuid::new_v4(),
            text: text.into(),
        }
    }

    #[test]
    fn delivers_only_to_present_players() {
        let roster = LocalRoster::default();
        let (here, away) = (Uuid::new_v4(), Uuid::new_v4());
        roster.join(here);
        let (mut world_loop, handle) =
            WorldLoop::with_limits(LocalWorld::new(roster.clone()), 8, 8, Duration::ZERO);

        assert!(handle.deliver(vec![here, away], line("hi")));
        assert_eq!(world_loop.tick(), Some(1));
        assert_eq!(roster.lines_for(here).len(), 1);
        assert!(roster.lines_for(away).is_empty());
    }

    #[test]
    fn tick_is_bounded_and_queue_is_bounded() {
        let roster = LocalRoster::default();
        let player = Uuid::new_v4();
        roster.join(player);
        let (mut world_loop, handle) =
            WorldLoop::with_limits(LocalWorld::new(roster.clone()), 3, 2, Duration::ZERO);

        for n in 0..3 {
            assert!(handle.deliver(vec![player], line(&n.to_string())));
        }
        assert!(!handle.deliver(vec![player], line("overflow")));

        assert_eq!(world_loop.tick(), Some(2));
        assert_eq!(world_loop.tick(), Some(1));
        assert_eq!(world_loop.tick(), Some(0));
        assert_eq!(roster.lines_for(player).len(), 3);

        drop(handle);
        assert_eq!(world_loop.tick(), None);
    }

    #[test]
    fn inbox_is_bounded_and_drained_by_take() {
        let roster = LocalRoster::default();
        let player = Uuid::new_v4();
        roster.join(player);
        for n in 0..INBOX_LIMIT + 3 {
            roster.record(player, &line(&n.to_string()));
        }
        let lines = roster.take_lines(player);
        assert_eq!(lines.len(), INBOX_LIMIT);
        assert_eq!(lines[0].text, "3");
        assert!(roster.take_lines(player).is_empty());

        roster.record(player, &line("bye"));
        roster.leave(player);
        assert!(roster.lines_for(player).is_empty());
    }

    #[tokio::test]
    async fn presence_is_answered_by_the_loop() {
        let roster = LocalRoster::default();
        let (here, away) = (Uuid::new_v4(), Uuid::new_v4());
        roster.join(here);
        let (world_loop, handle) =
            WorldLoop::with_limits(LocalWorld::new(roster), 8, 8, Duration::from_millis(1));
        let thread = world_loop.spawn().unwrap();

        let present = handle.present(vec![here, away]).await.unwrap();
        assert!(present.contains(&here));
        assert!(!present.contains(&away));
        assert!(!handle.is_present(away).await.unwrap());

        drop(handle);
        thread.join().unwrap();
    }

    #[tokio::test]
    async fn stopped_loop_reports_unavailable() {
        let (world_loop, handle) =
            WorldLoop::with_limits(LocalWorld::default(), 8, 8, Duration::ZERO);
        drop(world_loop);
        let err = handle.present(vec![Uuid::new_v4()]).await.unwrap_err();
        assert!(matches!(err, KinshipError::WorldUnavailable));
    }
}
