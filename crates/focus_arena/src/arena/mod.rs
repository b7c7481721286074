pub(crate) mod content;
pub(crate) mod player;
pub(crate) mod scene;
pub(crate) mod typist;

pub(crate) use content::{load_target_defs, parse_target_defs, ContentError, DEFAULT_TARGETS_XML};
pub(crate) use scene::{ArenaOutcome, ArenaScene, ArenaSettings, ArenaSummary};
