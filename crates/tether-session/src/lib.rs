pub mod continuity;
pub mod launcher;
pub mod machine;
pub mod observer;
pub mod tracker;
pub mod watcher;

pub use continuity::{decide, ContinuityManager, LaunchDecision, StartReport, WorkspaceContext};
pub use launcher::{
    build_args, display_args, resolve_workdir, AgentLauncher, CodexLauncher, LaunchHandle,
    LaunchMode, LaunchRequest, MockLauncher,
};
pub use machine::{ContinuityMachine, ContinuityState};
pub use observer::{DirectoryObserver, Observation, SessionObserver};
pub use tracker::{FileSessionTracker, MemorySessionStore, SessionStore, TrackerError, TrackingEntry};
pub use watcher::{PollOutcome, PollSettings, SessionRecord};
