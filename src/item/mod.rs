/// Grid-of-cells abstraction shared by contact and response tables.
pub mod table;

/// Row processors that turn a contact row into an outbound request.
pub mod payload;

/// Dispatch results and the writers that record them.
pub mod result;

#[cfg(feature = "csv")]
#[cfg_attr(docsrs, doc(cfg(feature = "csv")))]
/// This module provides a CSV file backed table.
pub mod csv;

#[cfg(feature = "logger")]
#[cfg_attr(docsrs, doc(cfg(feature = "logger")))]
/// This module provides a messaging client that only logs, for dry runs.
pub mod logger;
