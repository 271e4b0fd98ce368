use std::collections::BTreeMap;

use crate::FlagRegistryError;

/// Declares one flag of a [`FlagRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagSpec {
    /// The unique flag name, e.g. `SECPROV_CLIENT_AUTH`.
    pub name: &'static str,
    /// A human readable description.
    pub displayname: &'static str,
    /// The names of flags this one implies.
    pub implies: &'static [&'static str],
}

/// A registered flag together with its implication closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagInfo {
    /// The unique flag name.
    pub name: &'static str,
    /// A human readable description.
    pub displayname: &'static str,
    /// The bit this flag occupies.
    pub bit: u32,
    /// This flag's bit together with every flag it implies.
    pub closure: u32,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    Open,
    Closed,
}

/// An immutable table of named flags with acyclic implications.
///
/// Every flag value produced through a registry is closed under
/// implication: a set holding a flag also holds every flag it implies.
///
/// ```
/// use portico_affordance::{FlagRegistry, FlagSpec};
///
/// let registry = FlagRegistry::new(&[
///     FlagSpec { name: "H", displayname: "h", implies: &[] },
///     FlagSpec { name: "G", displayname: "g", implies: &["H"] },
///     FlagSpec { name: "F", displayname: "f", implies: &["G"] },
/// ])?;
///
/// let f = registry.bits(&["F"])?;
/// assert_eq!(registry.names(f), vec!["H", "G", "F"]);
/// # Ok::<(), portico_affordance::FlagRegistryError>(())
/// ```
#[derive(Debug, Clone)]
pub struct FlagRegistry {
    flags: Vec<FlagInfo>,
    index: BTreeMap<&'static str, usize>,
}

impl FlagRegistry {
    /// The largest number of flags a registry can hold.
    pub const CAPACITY: usize = 32;

    /// Validates `specs` and computes every implication closure.
    pub fn new(specs: &[FlagSpec]) -> Result<Self, FlagRegistryError> {
        if specs.len() > Self::CAPACITY {
            return Err(FlagRegistryError::TooManyFlags {
                count: specs.len(),
                capacity: Self::CAPACITY,
            });
        }

        let mut index = BTreeMap::new();
        for (position, spec) in specs.iter().enumerate() {
            if index.insert(spec.name, position).is_some() {
                return Err(FlagRegistryError::DuplicateFlag {
                    name: spec.name.to_string(),
                });
            }
        }

        let edges = specs
            .iter()
            .map(|spec| {
                spec.implies
                    .iter()
                    .map(|implied| {
                        index.get(implied).copied().ok_or_else(|| {
                            FlagRegistryError::UnknownImplication {
                                flag: spec.name.to_string(),
                                implied: implied.to_string(),
                            }
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut visits = vec![Visit::New; specs.len()];
        let mut closures = vec![0u32; specs.len()];
        for position in 0..specs.len() {
            close(position, specs, &edges, &mut visits, &mut closures)?;
        }

        let flags = specs
            .iter()
            .zip(closures)
            .enumerate()
            .map(|(position, (spec, closure))| FlagInfo {
                name: spec.name,
                displayname: spec.displayname,
                bit: 1 << position,
                closure,
            })
            .collect();

        Ok(Self { flags, index })
    }

    /// The number of registered flags.
    pub fn len(&self) -> usize {
        self.flags.len()
    }

    /// Whether no flags are registered.
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Looks a flag up by name.
    pub fn flag(&self, name: &str) -> Option<&FlagInfo> {
        self.index.get(name).map(|position| &self.flags[*position])
    }

    /// The registered flags in registration order.
    pub fn flags(&self) -> &[FlagInfo] {
        &self.flags
    }

    /// The closed bits for the named flags.
    pub fn bits(&self, names: &[&str]) -> Result<u32, FlagRegistryError> {
        names.iter().try_fold(0, |bits, name| {
            self.flag(name)
                .map(|flag| bits | flag.closure)
                .ok_or_else(|| FlagRegistryError::UnknownFlag {
                    name: name.to_string(),
                })
        })
    }

    /// Closes `bits` under implication, dropping unregistered bits.
    pub fn close(&self, bits: u32) -> u32 {
        self.flags
            .iter()
            .filter(|flag| bits & flag.bit != 0)
            .fold(0, |closed, flag| closed | flag.closure)
    }

    /// The flags set in `bits`, in registration order.
    pub fn set_flags(&self, bits: u32) -> impl Iterator<Item = &FlagInfo> {
        self.flags.iter().filter(move |flag| bits & flag.bit != 0)
    }

    /// The names of the flags set in `bits`, in registration order.
    pub fn names(&self, bits: u32) -> Vec<&'static str> {
        self.set_flags(bits).map(|flag| flag.name).collect()
    }

    /// Every implication-closed combination of flags, in ascending order.
    pub fn closed_sets(&self) -> Vec<u32> {
        let mut sets = std::collections::BTreeSet::from([0u32]);
        for flag in &self.flags {
            let extended: Vec<u32> = sets.iter().map(|set| set | flag.closure).collect();
            sets.extend(extended);
        }
        sets.into_iter().collect()
    }
}

fn close(
    position: usize,
    specs: &[FlagSpec],
    edges: &[Vec<usize>],
    visits: &mut [Visit],
    closures: &mut [u32],
) -> Result<u32, FlagRegistryError> {
    match visits[position] {
        Visit::Closed => Ok(closures[position]),
        Visit::Open => Err(FlagRegistryError::CyclicImplication {
            flag: specs[position].name.to_string(),
        }),
        Visit::New => {
            visits[position] = Visit::Open;
            let mut closure = 1 << position;
            for implied in &edges[position] {
                closure |= close(*implied, specs, edges, visits, closures)?;
            }
            closures[position] = closure;
            visits[position] = Visit::Closed;
            Ok(closure)
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::*;
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    fn spec(name: &'static str, implies: &'static [&'static str]) -> FlagSpec {
        FlagSpec {
            name,
            displayname: name,
            implies,
        }
    }

    #[test]
    fn it_closes_transitive_implications() -> TestResult {
        let registry = FlagRegistry::new(&[spec("F", &["G"]), spec("G", &["H"]), spec("H", &[])])?;
        let bits = registry.bits(&["F"])?;
        assert_eq!(registry.names(bits), vec!["F", "G", "H"]);
        assert_eq!(registry.close(registry.flag("G").map(|g| g.bit).unwrap_or(0)), 0b110);
        Ok(())
    }

    #[test]
    fn it_rejects_self_implication() {
        let error = FlagRegistry::new(&[spec("F", &["F"])]).unwrap_err();
        assert_eq!(
            error,
            FlagRegistryError::CyclicImplication { flag: "F".into() }
        );
    }

    #[test]
    fn it_rejects_transitive_cycles() {
        let error =
            FlagRegistry::new(&[spec("F", &["G"]), spec("G", &["H"]), spec("H", &["F"])])
                .unwrap_err();
        assert!(matches!(error, FlagRegistryError::CyclicImplication { .. }));
    }

    #[test]
    fn it_rejects_unknown_and_duplicate_flags() {
        assert!(matches!(
            FlagRegistry::new(&[spec("F", &["missing"])]),
            Err(FlagRegistryError::UnknownImplication { .. })
        ));
        assert!(matches!(
            FlagRegistry::new(&[spec("F", &[]), spec("F", &[])]),
            Err(FlagRegistryError::DuplicateFlag { .. })
        ));
    }

    #[test]
    fn it_enumerates_closed_sets() -> TestResult {
        let registry = FlagRegistry::new(&[spec("A", &[]), spec("B", &["A"])])?;
        // {B} alone is not closed.
        assert_eq!(registry.closed_sets(), vec![0b00, 0b01, 0b11]);
        Ok(())
    }
}
