// Domain endpoint groups
//
// Each file adds inherent methods to `UnifiClient` for one area of the
// controller API. All of them go through the shared request pipeline.

mod alarms;
mod clients;
mod devices;
mod networks;
mod system;

use serde_json::Value;

/// Command endpoints answer with an (ignored) array of affected records,
/// or with a bare `meta` envelope and no `data` at all.
pub(crate) type CommandAck = Value;
