//! Per-thread default factory.
//!
//! Code that would otherwise thread a [`Factory`] through every call can
//! install one here and fetch it with [`current`]. The slot is
//! thread-local, matching the factory's single-threaded model.
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use sqlreflect_db::StoreConfig;
//! use sqlreflect_sqlite::{Factory, global};
//!
//! let factory = Factory::from_raw(&json!({"Game": {"name": "TEXT"}}), StoreConfig::in_memory()).unwrap();
//! factory.create_tables().unwrap();
//! global::install(factory);
//!
//! let g = global::entity("Game").unwrap().create(json!({"name": "g1"})).unwrap();
//! assert_eq!(g.idx(), 1);
//! global::uninstall();
//! ```

use std::cell::RefCell;

use tracing::debug;

use crate::error::{OrmError, Result};
use crate::factory::{EntityType, Factory};

thread_local! {
    static CURRENT: RefCell<Option<Factory>> = const { RefCell::new(None) };
}

/// Makes `factory` this thread's default, returning the one it replaces.
pub fn install(factory: Factory) -> Option<Factory> {
    debug!(?factory, "installing thread factory");
    CURRENT.with(|slot| slot.borrow_mut().replace(factory))
}

/// Removes and returns this thread's default factory.
///
/// Instances created through it stay usable as long as some handle to the
/// factory is alive.
pub fn uninstall() -> Option<Factory> {
    CURRENT.with(|slot| slot.borrow_mut().take())
}

/// A handle to this thread's default factory.
///
/// # Errors
///
/// Returns [`OrmError::NoFactory`] if none is installed.
pub fn current() -> Result<Factory> {
    CURRENT.with(|slot| slot.borrow().clone().ok_or(OrmError::NoFactory))
}

pub fn is_installed() -> bool {
    CURRENT.with(|slot| slot.borrow().is_some())
}

/// Shorthand for `current()?.entity(name)`.
pub fn entity(name: &str) -> Result<EntityType> {
    current()?.entity(name)
}
