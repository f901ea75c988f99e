use serde_yaml::{Mapping, Value};
use thiserror::Error;

use crate::snapshot::{Argv, KvSet, Snapshot};

/// Why a service entry cannot be launched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("entry is not a mapping")]
    NotAMapping,

    #[error("missing `command`")]
    MissingCommand,

    #[error("`command` is not a list")]
    CommandNotAList,

    #[error("`command` is empty")]
    EmptyCommand,

    #[error("`command` element {0} is not a string")]
    NonStringArgument(usize),

    #[error("`{0}` is not a mapping")]
    NotATable(&'static str),

    #[error("`{field}` has a non-string key or value")]
    NonStringEntry { field: &'static str },
}

/*
    @@@
    @parse_entry();
    . Validates one raw service entry and fills `into` with what it describes.
    . `command` must be a non-empty list of strings; it is stored only once the whole list checks out.
    . `env` and `data` are optional mappings whose keys and values must all be strings.
    . Parsing stops at the first problem, so `into` keeps whatever was accepted before it.
*/
pub fn parse_entry(entry: &Value, into: &mut Snapshot) -> Result<(), ConfigError> {
    let table = match entry {
        Value::Mapping(m) => m,
        Value::Null => return Err(ConfigError::MissingCommand),
        _ => return Err(ConfigError::NotAMapping),
    };

    into.command = parse_command(table.get("command"))?;

    if let Some(env) = table.get("env") {
        into.env = parse_table("env", env)?;
    }
    if let Some(data) = table.get("data") {
        into.data = parse_table("data", data)?;
    }

    Ok(())
}

fn parse_command(value: Option<&Value>) -> Result<Argv, ConfigError> {
    let list = match value {
        None | Some(Value::Null) => return Err(ConfigError::MissingCommand),
        Some(Value::Sequence(list)) => list,
        Some(_) => return Err(ConfigError::CommandNotAList),
    };

    let args = list
        .iter()
        .enumerate()
        .map(|(idx, arg)| {
            arg.as_str()
                .map(str::to_owned)
                .ok_or(ConfigError::NonStringArgument(idx))
        })
        .collect::<Result<Vec<_>, _>>()?;

    if args.is_empty() {
        return Err(ConfigError::EmptyCommand);
    }
    Ok(Argv::new(args))
}

fn parse_table(field: &'static str, value: &Value) -> Result<KvSet, ConfigError> {
    let table: &Mapping = match value {
        Value::Mapping(m) => m,
        Value::Null => return Ok(KvSet::default()),
        _ => return Err(ConfigError::NotATable(field)),
    };

    let mut set = KvSet::default();
    for (k, v) in table {
        match (k.as_str(), v.as_str()) {
            (Some(k), Some(v)) => set.insert(k, v),
            _ => return Err(ConfigError::NonStringEntry { field }),
        }
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> (Snapshot, Result<(), ConfigError>) {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        let mut snap = Snapshot::default();
        let res = parse_entry(&value, &mut snap);
        (snap, res)
    }

    #[test]
    fn full_entry() {
        let (snap, res) = parse(
            r#"
            command: ["/bin/sleep", "5"]
            env: { A: "1", B: two }
            data: { owner: ops }
            "#,
        );
        assert_eq!(res, Ok(()));
        assert_eq!(snap.command.as_slice(), ["/bin/sleep", "5"]);
        assert_eq!(snap.env.entries().collect::<Vec<_>>(), vec!["A=1", "B=two"]);
        assert_eq!(snap.data.len(), 1);
    }

    #[test]
    fn missing_command() {
        let (_, res) = parse("env: { A: b }");
        assert_eq!(res, Err(ConfigError::MissingCommand));
    }

    #[test]
    fn empty_command() {
        let (_, res) = parse("command: []");
        assert_eq!(res, Err(ConfigError::EmptyCommand));
    }

    #[test]
    fn non_string_argument() {
        let (snap, res) = parse("command: [/bin/sleep, 5]");
        assert_eq!(res, Err(ConfigError::NonStringArgument(1)));
        assert!(snap.command.is_empty());
    }

    #[test]
    fn non_string_env_value_keeps_command() {
        let (snap, res) = parse("command: [/bin/true]\nenv: { PORT: 8080 }");
        assert_eq!(res, Err(ConfigError::NonStringEntry { field: "env" }));
        assert_eq!(snap.command.program(), Some("/bin/true"));
    }

    #[test]
    fn env_must_be_a_table() {
        let (_, res) = parse("command: [/bin/true]\nenv: [A=1]");
        assert_eq!(res, Err(ConfigError::NotATable("env")));
    }

    #[test]
    fn null_entry_has_no_command() {
        let (_, res) = parse("~");
        assert_eq!(res, Err(ConfigError::MissingCommand));
    }
}
