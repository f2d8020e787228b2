//! Pipeline stages for one input file.
//!
//! Each submodule implements exactly one step of the per-file pipeline; the
//! executor strings them together and owns the live asset handle.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ upload ──▶ request ──▶ poll ──▶ save
//! (admit)   (client)   (body)     (wait)   (name + download)
//!                        ▲                   │
//!                        └──── next asset ───┘
//! ```
//!
//! 1. [`input`]   — discover files under the input root and decide, before
//!    any upload, whether each one may enter the pipeline
//! 2. [`request`] — build the JSON body for a step from the live handle, the
//!    step's parameters and the run-level options
//! 3. [`poll`]    — query a submitted job until `done`/`failed` with bounded
//!    backoff
//! 4. [`save`]    — derive output names and write every artifact of a
//!    finished job

pub mod input;
pub mod poll;
pub mod request;
pub mod save;
