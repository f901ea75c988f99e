use std::collections::BTreeMap;
use std::fmt;

// Ordered argument vector; argv[0] is the program looked up in PATH.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Argv(Vec<String>);

impl Argv {
    pub fn new(args: Vec<String>) -> Self {
        Argv(args)
    }

    pub fn program(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Argv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

/// Set of `KEY=VALUE` strings.
///
/// Stored by key so two sets built in different orders compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KvSet(BTreeMap<String, String>);

impl KvSet {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Entries rendered as `KEY=VALUE`.
    pub fn entries(&self) -> impl Iterator<Item = String> + '_ {
        self.0.iter().map(|(k, v)| format!("{}={}", k, v))
    }

    /// Release our contents, then take over `src`'s, leaving `src` empty.
    pub fn adopt(&mut self, src: &mut KvSet) {
        self.0.clear();
        self.0 = std::mem::take(&mut src.0);
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for KvSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = KvSet::default();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

/// The command/environment/data triple an instance is launched from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub command: Argv,
    pub env: KvSet,
    pub data: KvSet,
}

impl Snapshot {
    /// Whether `other` would launch a different process than `self`.
    pub fn differs(&self, other: &Snapshot) -> bool {
        self.command != other.command || self.env != other.env || self.data != other.data
    }

    /// Move the contents of `src` into `self`. `src` keeps an empty env/data afterwards.
    pub fn adopt(&mut self, src: &mut Snapshot) {
        self.env.adopt(&mut src.env);
        self.data.adopt(&mut src.data);
        self.command = std::mem::take(&mut src.command);
    }
}

/*
    @@@
    @config_changed();
    . An invalid previous configuration always counts as a change, whatever the new one holds.
    . Otherwise any difference in command, env or data is a change; there is no partial reload.
*/
pub fn config_changed(valid_before: bool, old: &Snapshot, new: &Snapshot) -> bool {
    !valid_before || old.differs(new)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Argv {
        Argv::new(args.iter().map(|s| s.to_string()).collect())
    }

    fn snapshot(cmd: &[&str], env: &[(&str, &str)]) -> Snapshot {
        Snapshot {
            command: argv(cmd),
            env: env.iter().copied().collect(),
            data: KvSet::default(),
        }
    }

    #[test]
    fn env_order_does_not_matter() {
        let a = snapshot(&["/bin/true"], &[("A", "1"), ("B", "2")]);
        let b = snapshot(&["/bin/true"], &[("B", "2"), ("A", "1")]);
        assert!(!config_changed(true, &a, &b));
    }

    #[test]
    fn argv_order_matters() {
        let a = snapshot(&["/bin/echo", "x", "y"], &[]);
        let b = snapshot(&["/bin/echo", "y", "x"], &[]);
        assert!(config_changed(true, &a, &b));
    }

    #[test]
    fn env_value_change_is_detected() {
        let a = snapshot(&["/bin/true"], &[("A", "1")]);
        let b = snapshot(&["/bin/true"], &[("A", "2")]);
        assert!(config_changed(true, &a, &b));
    }

    #[test]
    fn data_change_is_detected() {
        let a = snapshot(&["/bin/true"], &[]);
        let mut b = a.clone();
        b.data.insert("owner", "ops");
        assert!(config_changed(true, &a, &b));
    }

    #[test]
    fn invalid_before_always_changes() {
        let a = snapshot(&["/bin/true"], &[]);
        assert!(config_changed(false, &a, &a.clone()));
    }

    #[test]
    fn adopt_moves_and_empties_source() {
        let mut dst = snapshot(&["/bin/a"], &[("OLD", "1")]);
        let mut src = snapshot(&["/bin/b"], &[("NEW", "2")]);
        src.data.insert("k", "v");

        dst.adopt(&mut src);

        assert_eq!(dst.command, argv(&["/bin/b"]));
        assert_eq!(dst.env.entries().collect::<Vec<_>>(), vec!["NEW=2"]);
        assert_eq!(dst.data.len(), 1);
        assert!(src.env.is_empty());
        assert!(src.data.is_empty());
        assert!(src.command.is_empty());
    }
}
