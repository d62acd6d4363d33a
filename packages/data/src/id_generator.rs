use crc32fast::Hasher;

/// Short stable seed derived from an arbitrary string (client id, session id)
pub fn get_seed_id(source: &str) -> String {
    let mut hasher = Hasher::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Sequential id generator for records created by one client
#[derive(Debug, Clone)]
pub struct IdGenerator {
    seed: String,
    count: u32,
}

impl IdGenerator {
    pub fn new(client_id: &str) -> Self {
        Self {
            seed: get_seed_id(client_id),
            count: 0,
        }
    }

    pub fn from_seed(seed: String) -> Self {
        Self { seed, count: 0 }
    }

    /// Generate next sequential id
    pub fn new_id(&mut self) -> String {
        self.count += 1;
        format!("{}-{}", self.seed, self.count)
    }

    /// Generate the next id for which `exists` returns false
    ///
    /// Used when the generator may have produced ids in a previous session
    /// that are already part of a loaded snapshot.
    pub fn new_unique_id(&mut self, exists: impl Fn(&str) -> bool) -> String {
        loop {
            let id = self.new_id();
            if !exists(&id) {
                return id;
            }
        }
    }

    pub fn seed(&self) -> &str {
        &self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_is_stable() {
        assert_eq!(get_seed_id("client-1"), get_seed_id("client-1"));
        assert_ne!(get_seed_id("client-1"), get_seed_id("client-2"));
    }

    #[test]
    fn test_sequential_ids() {
        let mut gen = IdGenerator::new("client-1");

        let id1 = gen.new_id();
        let id2 = gen.new_id();

        assert!(id1.ends_with("-1"));
        assert!(id2.ends_with("-2"));
        assert!(id1.starts_with(gen.seed()));
    }

    #[test]
    fn test_unique_id_skips_taken() {
        let mut gen = IdGenerator::from_seed("s".into());
        let id = gen.new_unique_id(|id| id == "s-1" || id == "s-2");
        assert_eq!(id, "s-3");
    }
}
