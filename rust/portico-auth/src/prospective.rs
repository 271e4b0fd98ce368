use std::fmt::{Display, Formatter};
use std::ops::{BitAnd, BitOr, Deref, DerefMut};

use portico_affordance::{
    AffordanceComponent, InfiniteAffordances, ProcessAffordanceSet, USet,
    UnsatisfiableAffordances,
};

use crate::ConnectorRole;

/// Process affordances together with the candidate connectors of each role.
///
/// Connectors are identified by their registration index within their role,
/// so iterating a finite candidate set visits them in registration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProspectiveAffordanceSet {
    process: ProcessAffordanceSet,
    clerks: USet<usize>,
    scanners: USet<usize>,
    supplicants: USet<usize>,
}

impl ProspectiveAffordanceSet {
    /// Builds a set from its parts.
    pub fn new(
        process: ProcessAffordanceSet,
        clerks: USet<usize>,
        scanners: USet<usize>,
        supplicants: USet<usize>,
    ) -> Self {
        Self {
            process,
            clerks,
            scanners,
            supplicants,
        }
    }

    /// Process affordances with every connector a candidate.
    pub fn from_process(process: ProcessAffordanceSet) -> Self {
        Self::new(process, USet::Universal, USet::Universal, USet::Universal)
    }

    /// Every field universal.
    pub fn max() -> Self {
        Self::from_process(ProcessAffordanceSet::max())
    }

    /// Every field empty.
    pub fn min() -> Self {
        Self::new(
            ProcessAffordanceSet::min(),
            USet::empty(),
            USet::empty(),
            USet::empty(),
        )
    }

    /// The process affordances.
    pub fn process(&self) -> &ProcessAffordanceSet {
        &self.process
    }

    /// The candidates of `role`.
    pub fn connectors(&self, role: ConnectorRole) -> &USet<usize> {
        match role {
            ConnectorRole::Clerk => &self.clerks,
            ConnectorRole::Scanner => &self.scanners,
            ConnectorRole::Supplicant => &self.supplicants,
        }
    }

    /// Replaces the candidates of `role`.
    pub fn with_connectors(mut self, role: ConnectorRole, candidates: USet<usize>) -> Self {
        match role {
            ConnectorRole::Clerk => self.clerks = candidates,
            ConnectorRole::Scanner => self.scanners = candidates,
            ConnectorRole::Supplicant => self.supplicants = candidates,
        }
        self
    }

    /// The components with no members.
    pub fn empty_components(&self) -> Vec<AffordanceComponent> {
        let mut components = self.process.empty_components();
        for role in ConnectorRole::ALL {
            if self.connectors(role).is_empty() {
                components.push(component(role));
            }
        }
        components
    }

    /// Fails naming every empty component.
    pub fn require_nonempty(&self) -> Result<(), UnsatisfiableAffordances> {
        let components = self.empty_components();
        if components.is_empty() {
            Ok(())
        } else {
            Err(UnsatisfiableAffordances { components })
        }
    }

    /// Fails naming every universal component outside `exceptions`.
    pub fn require_finite(
        &self,
        exceptions: &[AffordanceComponent],
    ) -> Result<(), InfiniteAffordances> {
        let mut components = self.process.infinite_components();
        for role in ConnectorRole::ALL {
            if self.connectors(role).is_universal() {
                components.push(component(role));
            }
        }
        components.retain(|component| !exceptions.contains(component));
        if components.is_empty() {
            Ok(())
        } else {
            Err(InfiniteAffordances { components })
        }
    }
}

fn component(role: ConnectorRole) -> AffordanceComponent {
    match role {
        ConnectorRole::Clerk => AffordanceComponent::Clerks,
        ConnectorRole::Scanner => AffordanceComponent::Scanners,
        ConnectorRole::Supplicant => AffordanceComponent::Supplicants,
    }
}

impl Deref for ProspectiveAffordanceSet {
    type Target = ProcessAffordanceSet;

    fn deref(&self) -> &ProcessAffordanceSet {
        &self.process
    }
}

impl DerefMut for ProspectiveAffordanceSet {
    fn deref_mut(&mut self) -> &mut ProcessAffordanceSet {
        &mut self.process
    }
}

impl From<ProcessAffordanceSet> for ProspectiveAffordanceSet {
    fn from(process: ProcessAffordanceSet) -> Self {
        Self::from_process(process)
    }
}

impl BitAnd for &ProspectiveAffordanceSet {
    type Output = ProspectiveAffordanceSet;

    fn bitand(self, rhs: Self) -> ProspectiveAffordanceSet {
        ProspectiveAffordanceSet::new(
            &self.process & &rhs.process,
            &self.clerks & &rhs.clerks,
            &self.scanners & &rhs.scanners,
            &self.supplicants & &rhs.supplicants,
        )
    }
}

impl BitOr for &ProspectiveAffordanceSet {
    type Output = ProspectiveAffordanceSet;

    fn bitor(self, rhs: Self) -> ProspectiveAffordanceSet {
        ProspectiveAffordanceSet::new(
            &self.process | &rhs.process,
            &self.clerks | &rhs.clerks,
            &self.scanners | &rhs.scanners,
            &self.supplicants | &rhs.supplicants,
        )
    }
}

impl Display for ProspectiveAffordanceSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let show = |set: &USet<usize>| match set.as_finite() {
            Some(indices) => indices.len().to_string(),
            None => "*".to_string(),
        };
        write!(
            f,
            "{}, clerks={}, scanners={}, supplicants={}",
            self.process,
            show(&self.clerks),
            show(&self.scanners),
            show(&self.supplicants)
        )
    }
}
