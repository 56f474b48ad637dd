//! Name-based resolution of publisher implementations.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

use super::{NO_OP_PUBLISHER, Publisher};

/// Constructor of one publisher implementation.
pub type PublisherConstructor<P> = Box<dyn Fn() -> Box<P> + Send + Sync>;

/// Registry mapping implementation names to constructors.
///
/// `P` is the publisher kind, e.g. `dyn SnapshotPublisher`. Lookup is
/// case-sensitive. Unknown names resolve to the fallback constructor, which
/// is also registered under [`NO_OP_PUBLISHER`].
pub struct PublisherFactory<P: ?Sized> {
    kind: &'static str,
    constructors: HashMap<String, PublisherConstructor<P>>,
}

impl<P: ?Sized + Publisher> PublisherFactory<P> {
    /// Create a factory whose fallback is `no_op`.
    pub fn new<F>(kind: &'static str, no_op: F) -> Self
    where
        F: Fn() -> Box<P> + Send + Sync + 'static,
    {
        let mut constructors: HashMap<String, PublisherConstructor<P>> = HashMap::new();
        constructors.insert(NO_OP_PUBLISHER.to_string(), Box::new(no_op));
        Self { kind, constructors }
    }

    /// Register an implementation, replacing any previous one of that name.
    pub fn register<F>(mut self, name: impl Into<String>, constructor: F) -> Self
    where
        F: Fn() -> Box<P> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Box::new(constructor));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Instantiate and configure the implementation registered as `name`.
    ///
    /// Never fails: an unknown name yields the no-op implementation.
    pub fn create(&self, name: &str, config: &str) -> Box<P> {
        let constructor = match self.constructors.get(name) {
            Some(constructor) => constructor,
            None => {
                warn!(
                    kind = self.kind,
                    name = %name,
                    known = ?self.names(),
                    "Unknown publisher name, falling back to no-op"
                );
                &self.constructors[NO_OP_PUBLISHER]
            }
        };

        let mut publisher = constructor();
        publisher.configure(config);
        debug!(kind = self.kind, name = %publisher.name(), "Created publisher");
        publisher
    }
}

impl<P: ?Sized> fmt::Debug for PublisherFactory<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.constructors.keys().collect();
        names.sort_unstable();
        f.debug_struct("PublisherFactory")
            .field("kind", &self.kind)
            .field("names", &names)
            .finish()
    }
}
