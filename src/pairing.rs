use crate::batch::CancellationToken;
use crate::config::PairingOptions;
use crate::error::Result;
use crate::fingerprint::AttachmentFingerprint;
use crate::fragment::{FragmentValue, FragmentationRecord};
use crate::intern::Name;
use crate::molecule::Molecule;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::ops::AddAssign;
use tracing::*;

/// One side of a potential transform: a Value and the Key it was cut from.
#[derive(Debug, Clone)]
pub struct PairCandidate {
    pub key: Name,
    pub key_heavy_atoms: usize,
    pub value: FragmentValue,
    fingerprint: Option<AttachmentFingerprint>,
}

impl PairCandidate {
    pub fn from_record(record: &FragmentationRecord, id: Option<&str>) -> Self {
        let value = match id {
            Some(id) => record.value.clone().with_id(id),
            None => record.value.clone(),
        };
        Self {
            key: Name::new(record.key.smiles()),
            key_heavy_atoms: record.key.heavy_atom_count(),
            value,
            fingerprint: None,
        }
    }

    /// Build a candidate from already canonical Key and Value strings.
    pub fn from_strings(key: &str, value: &str, id: Option<String>) -> Result<Self> {
        let key_heavy_atoms = Molecule::from_smiles(key)?.heavy_atom_count();
        Ok(Self {
            key: Name::new(key),
            key_heavy_atoms,
            value: FragmentValue::new(value, id)?,
            fingerprint: None,
        })
    }

    pub fn id(&self) -> Option<&str> {
        self.value.id()
    }

    pub fn ratio(&self) -> f64 {
        match self.value.changing_heavy_atom_count() {
            0 => f64::INFINITY,
            changing => self.key_heavy_atoms as f64 / changing as f64,
        }
    }
}

/// A matched pair: `left` becomes `right` on a shared Key.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    pub left: FragmentValue,
    pub right: FragmentValue,
    pub key: Option<Name>,
    /// Changing heavy atoms of the left and right Values.
    pub heavy_atoms: Option<(usize, usize)>,
    /// Constant to changing ratios of the left and right sides.
    pub ratios: Option<(f64, f64)>,
}

impl Transform {
    pub fn left_id(&self) -> Option<&str> {
        self.left.id()
    }

    pub fn right_id(&self) -> Option<&str> {
        self.right.id()
    }

    /// The `left>>right` reaction string.
    pub fn transformation(&self) -> String {
        format!("{}>>{}", self.left.smiles(), self.right.smiles())
    }

    pub fn heavy_atom_delta(&self) -> i64 {
        self.right.changing_heavy_atom_count() as i64 - self.left.changing_heavy_atom_count() as i64
    }
}

impl Display for Transform {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(f, "{}", self.transformation())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairingStats {
    pub groups: usize,
    pub pairs_considered: usize,
    pub identical_values: usize,
    pub self_transforms: usize,
    pub delta_rejected: usize,
    pub fingerprint_rejected: usize,
    pub transforms: usize,
}

impl AddAssign for PairingStats {
    fn add_assign(&mut self, other: Self) {
        self.groups += other.groups;
        self.pairs_considered += other.pairs_considered;
        self.identical_values += other.identical_values;
        self.self_transforms += other.self_transforms;
        self.delta_rejected += other.delta_rejected;
        self.fingerprint_rejected += other.fingerprint_rejected;
        self.transforms += other.transforms;
    }
}

impl Display for PairingStats {
    fn fmt(&self, f: &mut Formatter) -> FmtResult {
        write!(
            f,
            "{} transforms from {} pairs in {} groups ({} identical, {} self, {} outside delta, {} dissimilar)",
            self.transforms,
            self.pairs_considered,
            self.groups,
            self.identical_values,
            self.self_transforms,
            self.delta_rejected,
            self.fingerprint_rejected
        )
    }
}

pub struct PairMatcher {
    options: PairingOptions,
}

impl PairMatcher {
    pub fn new(options: PairingOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &PairingOptions {
        &self.options
    }

    /// Attach the fingerprint the configured filter needs, if any.
    pub fn prepare(&self, mut candidate: PairCandidate) -> Result<PairCandidate> {
        if let Some(filter) = &self.options.fingerprint {
            candidate.fingerprint = Some(AttachmentFingerprint::from_smiles(
                candidate.value.smiles(),
                filter.radius,
            )?);
        }
        Ok(candidate)
    }

    fn delta_allowed(&self, delta: i64) -> bool {
        match self.options.delta_heavy_atom_range {
            Some((min, max)) => (min..=max).contains(&delta),
            None => true,
        }
    }

    fn transform(&self, left: &PairCandidate, right: &PairCandidate) -> Transform {
        Transform {
            left: left.value.clone(),
            right: right.value.clone(),
            key: self.options.include_key.then(|| left.key.clone()),
            heavy_atoms: self.options.include_heavy_atom_counts.then(|| {
                (
                    left.value.changing_heavy_atom_count(),
                    right.value.changing_heavy_atom_count(),
                )
            }),
            ratios: self
                .options
                .include_ratios
                .then(|| (left.ratio(), right.ratio())),
        }
    }

    /// The transforms between two candidates sharing a Key: `left>>right`
    /// and, when requested, `right>>left`. Each direction is checked against
    /// the heavy-atom delta range on its own.
    pub fn match_pair(
        &self,
        left: &PairCandidate,
        right: &PairCandidate,
        stats: &mut PairingStats,
    ) -> Vec<Transform> {
        stats.pairs_considered += 1;
        if left.key != right.key {
            return Vec::new();
        }
        if left.value.eq_ignoring_id(&right.value) {
            stats.identical_values += 1;
            return Vec::new();
        }
        if !self.options.allow_self_transforms && left.id() == right.id() {
            stats.self_transforms += 1;
            return Vec::new();
        }
        if let (Some(filter), Some(a), Some(b)) = (
            &self.options.fingerprint,
            &left.fingerprint,
            &right.fingerprint,
        ) {
            if !filter.accepts(a, b) {
                stats.fingerprint_rejected += 1;
                return Vec::new();
            }
        }

        let delta = right.value.changing_heavy_atom_count() as i64
            - left.value.changing_heavy_atom_count() as i64;
        let mut transforms = Vec::new();
        if self.delta_allowed(delta) {
            transforms.push(self.transform(left, right));
        } else {
            stats.delta_rejected += 1;
        }
        if self.options.include_reverse {
            if self.delta_allowed(-delta) {
                transforms.push(self.transform(right, left));
            } else {
                stats.delta_rejected += 1;
            }
        }
        stats.transforms += transforms.len();
        transforms
    }

    /// All transforms within one group of candidates sharing a Key.
    pub fn match_group(
        &self,
        group: &[PairCandidate],
        cancel: &CancellationToken,
    ) -> Result<(Vec<Transform>, PairingStats)> {
        let mut stats = PairingStats {
            groups: 1,
            ..Default::default()
        };
        let mut transforms = Vec::new();
        for (i, left) in group.iter().enumerate() {
            for right in &group[i + 1..] {
                cancel.check()?;
                transforms.extend(self.match_pair(left, right, &mut stats));
            }
        }
        trace!("Group {:?}: {stats}", group.first().map(|c| &c.key));
        Ok((transforms, stats))
    }

    /// Transforms between `table[row]` and every later row with the same
    /// Key, comparing Keys on the fly.
    pub fn match_row(
        &self,
        table: &[PairCandidate],
        row: usize,
        cancel: &CancellationToken,
    ) -> Result<(Vec<Transform>, PairingStats)> {
        let mut stats = PairingStats::default();
        let mut transforms = Vec::new();
        let Some(left) = table.get(row) else {
            return Ok((transforms, stats));
        };
        for right in &table[row + 1..] {
            cancel.check()?;
            if right.key == left.key {
                transforms.extend(self.match_pair(left, right, &mut stats));
            }
        }
        Ok((transforms, stats))
    }
}

/// Split candidates into runs of equal Keys. Input sorted by Key gives one
/// run per Key.
pub fn group_by_key(candidates: Vec<PairCandidate>) -> Vec<Vec<PairCandidate>> {
    let mut groups: Vec<Vec<PairCandidate>> = Vec::new();
    for candidate in candidates {
        match groups.last_mut() {
            Some(group) if group[0].key == candidate.key => group.push(candidate),
            _ => groups.push(vec![candidate]),
        }
    }
    groups
}
