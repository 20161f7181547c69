//! Selector-indexed view of a contract ABI.
//!
//! Logs are matched on `topic0`, call traces on the 4-byte function selector.
//! Names that are overloaded in the ABI cannot be addressed by a handler
//! name, so they are left out of the index and reported via [`AbiIndex::overloaded`].

use std::collections::{BTreeSet, HashMap};

use alloy_json_abi::{Event as AbiEvent, Function as AbiFunction, JsonAbi};
use alloy_primitives::B256;

#[derive(Debug, Clone)]
pub struct AbiEventEntry {
    /// Short name, e.g. `Transfer`.
    pub name: String,
    /// Canonical signature, e.g. `Transfer(address,address,uint256)`.
    pub signature: String,
    pub item: AbiEvent,
}

#[derive(Debug, Clone)]
pub struct AbiFunctionEntry {
    /// Handler-facing name, e.g. `transfer()`.
    pub name: String,
    pub signature: String,
    pub item: AbiFunction,
}

/// Events keyed by selector, functions keyed by 4-byte selector.
#[derive(Debug, Clone, Default)]
pub struct AbiIndex {
    events: HashMap<B256, AbiEventEntry>,
    functions: HashMap<[u8; 4], AbiFunctionEntry>,
    overloaded: BTreeSet<String>,
}

impl AbiIndex {
    pub fn new(abi: &JsonAbi) -> Self {
        let mut index = Self::default();

        for (name, overloads) in &abi.events {
            if overloads.len() > 1 {
                index.overloaded.insert(name.clone());
                continue;
            }
            for event in overloads {
                // anonymous events carry no topic0 to match on
                if event.anonymous {
                    continue;
                }
                index.events.insert(
                    event.selector(),
                    AbiEventEntry {
                        name: name.clone(),
                        signature: event.signature(),
                        item: event.clone(),
                    },
                );
            }
        }

        for (name, overloads) in &abi.functions {
            if overloads.len() > 1 {
                index.overloaded.insert(format!("{name}()"));
                continue;
            }
            for function in overloads {
                index.functions.insert(
                    function.selector().0,
                    AbiFunctionEntry {
                        name: format!("{name}()"),
                        signature: function.signature(),
                        item: function.clone(),
                    },
                );
            }
        }

        index
    }

    /// Parse a JSON ABI array.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let abi: JsonAbi = serde_json::from_str(json)?;
        Ok(Self::new(&abi))
    }

    pub fn event(&self, selector: &B256) -> Option<&AbiEventEntry> {
        self.events.get(selector)
    }

    pub fn function(&self, selector: &[u8; 4]) -> Option<&AbiFunctionEntry> {
        self.functions.get(selector)
    }

    pub fn event_selectors(&self) -> Vec<B256> {
        let mut selectors: Vec<B256> = self.events.keys().copied().collect();
        selectors.sort();
        selectors
    }

    pub fn function_selectors(&self) -> Vec<[u8; 4]> {
        let mut selectors: Vec<[u8; 4]> = self.functions.keys().copied().collect();
        selectors.sort();
        selectors
    }

    /// Names of events (`Name`) and functions (`name()`) that have more than one overload.
    pub fn overloaded(&self) -> &BTreeSet<String> {
        &self.overloaded
    }

    /// Handler-addressable event names, sorted.
    pub fn event_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.events.values().map(|e| e.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Handler-addressable function names (`name()`), sorted.
    pub fn function_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.values().map(|f| f.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn has_event_named(&self, name: &str) -> bool {
        self.events.values().any(|e| e.name == name)
    }

    pub fn has_function_named(&self, name: &str) -> bool {
        self.functions.values().any(|f| f.name == name)
    }
}
