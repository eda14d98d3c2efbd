#![forbid(unsafe_code)]

use super::{DamonCtx, decode_list, encode_list, text_to_pid};
use crate::error::DecodeError;
use crate::fmt::indent_lines;
use crate::kvpairs::KvMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum KdamondState {
    On,
    #[default]
    Off,
}

impl KdamondState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::On => "on",
            Self::Off => "off",
        }
    }

    pub fn is_on(&self) -> bool {
        *self == Self::On
    }
}

impl From<bool> for KdamondState {
    fn from(running: bool) -> Self {
        if running { Self::On } else { Self::Off }
    }
}

impl fmt::Display for KdamondState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KdamondState {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            other => Err(DecodeError::UnknownVariant {
                kind: "kdamond state",
                value: other.to_string(),
            }),
        }
    }
}

/// A DAMON worker thread and the contexts it runs. `pid` is only known
/// while the thread is on.
#[derive(Debug, Clone, PartialEq)]
pub struct Kdamond {
    pub name: String,
    pub state: KdamondState,
    pub pid: Option<u32>,
    pub contexts: Vec<DamonCtx>,
}

impl Kdamond {
    const ENTITY: &'static str = "kdamond";

    pub fn new(name: impl Into<String>, contexts: Vec<DamonCtx>) -> Self {
        Self {
            name: name.into(),
            state: KdamondState::Off,
            pid: None,
            contexts,
        }
    }

    pub fn summary_str(&self) -> String {
        match self.pid {
            Some(pid) => format!("{} (state: {}, pid: {})", self.name, self.state, pid),
            None => format!("{} (state: {}, pid: none)", self.name, self.state),
        }
    }

    pub fn to_kvpairs(&self) -> KvMap {
        let mut kv = KvMap::new()
            .with("name", self.name.as_str())
            .with("state", self.state.as_str());
        if let Some(pid) = self.pid {
            kv.insert("pid", pid.to_string());
        }
        kv.with("contexts", encode_list(&self.contexts, DamonCtx::to_kvpairs))
    }

    pub fn from_kvpairs(kv: &KvMap) -> Result<Self, DecodeError> {
        let e = Self::ENTITY;
        let state = match kv.opt_str(e, "state")? {
            Some(state) => state.parse()?,
            None => KdamondState::Off,
        };
        let pid = match kv.opt_str(e, "pid")? {
            Some(_) => Some(kv.parse(e, "pid", text_to_pid)?),
            None => None,
        };
        if !kv.contains_key("contexts") {
            return Err(DecodeError::MissingField {
                entity: e,
                field: "contexts",
            });
        }
        Ok(Self {
            name: kv.str(e, "name")?.to_string(),
            state,
            pid,
            contexts: decode_list(kv, e, "contexts", DamonCtx::from_kvpairs)?,
        })
    }
}

impl fmt::Display for Kdamond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary_str())?;
        if !self.contexts.is_empty() {
            write!(f, "\ncontexts")?;
        }
        for ctx in &self.contexts {
            write!(f, "\n{}", indent_lines(&ctx.to_string(), 4))?;
        }
        Ok(())
    }
}
