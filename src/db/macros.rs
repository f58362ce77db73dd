//! Builder forwarding macros for reducing code duplication.
//!
//! `Db` exposes every clause method of `QueryBuilder` with the same signature.
//! These macros generate the delegating methods so the two stay in step while
//! keeping the list of forwarded methods readable in one place.

/// Generate infallible forwarding methods returning `&mut Self`.
///
/// # Example
///
/// ```ignore
/// impl Db {
///     forward_to_builder! {
///         /// Add a table to the FROM list.
///         fn from(&mut self, table: &str);
///     }
/// }
/// ```
macro_rules! forward_to_builder {
    ($( $(#[$meta:meta])* fn $name:ident(&mut self $(, $arg:ident : $ty:ty)*); )+) => {
        $(
            $(#[$meta])*
            pub fn $name(&mut self $(, $arg: $ty)*) -> &mut Self {
                self.builder.$name($($arg),*);
                self
            }
        )+
    };
}

/// Generate fallible forwarding methods returning `DbResult<&mut Self>`.
///
/// Used for conditions, which validate their operator when added.
macro_rules! try_forward_to_builder {
    ($( $(#[$meta:meta])* fn $name:ident(&mut self $(, $arg:ident : $ty:ty)*); )+) => {
        $(
            $(#[$meta])*
            pub fn $name(&mut self $(, $arg: $ty)*) -> $crate::error::DbResult<&mut Self> {
                self.builder.$name($($arg),*)?;
                Ok(self)
            }
        )+
    };
}

pub(crate) use forward_to_builder;
pub(crate) use try_forward_to_builder;
