//! External indexing service contract (spec §6): the narrow Sonarr/Radarr-
//! equivalent automation-API surface the core consumes but never owns.
//! Collaborator adapters beyond this contract (real Sonarr/Radarr/Jellyfin
//! HTTP clients) are explicitly out of scope (spec §1); this module defines
//! the trait boundary and one concrete `reqwest`-based implementation.

pub mod contracts;

pub use contracts::{
    ExternalIndexingService, ExternalServiceError, QueueItem, ReqwestIndexingService,
    SeriesLookup, SystemStatus,
};
