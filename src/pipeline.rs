//! The fragmentation and pairing stages over whole tables.

use crate::batch::{BatchEngine, CancellationToken, RowTask};
use crate::config::{FragmentationOptions, MmpConfig};
use crate::correlation::CorrelationMap;
use crate::error::{MmpError, Result};
use crate::factory::FragmentationFactory;
use crate::fragment::FragmentationRecord;
use crate::pairing::{group_by_key, PairCandidate, PairMatcher, PairingStats, Transform};
use crate::pattern::CompiledBondPattern;
use crate::table::{read_fragment_rows, FragmentRow, FragmentWriter, InputReader, InputRow, RejectWriter, TransformWriter};
use std::collections::BTreeSet;
use std::io::{Read, Write};
use std::sync::Arc;
use tracing::*;

/// The result of fragmenting one input row.
#[derive(Debug)]
pub struct FragmentOutcome {
    pub row: InputRow,
    pub result: std::result::Result<BTreeSet<FragmentationRecord>, String>,
}

struct FragmentTask {
    options: FragmentationOptions,
    pattern: Arc<CompiledBondPattern>,
}

impl RowTask for FragmentTask {
    type Row = Result<InputRow>;
    type Output = FragmentOutcome;

    fn compute(&self, index: usize, row: Self::Row) -> Result<FragmentOutcome> {
        let row = row?;
        if row.smiles.is_empty() {
            warn!("{}: missing molecule", row.row_id);
            return Ok(FragmentOutcome {
                row,
                result: Err("Missing molecule".to_string()),
            });
        }
        let mut factory = FragmentationFactory::with_pattern(self.options.clone(), self.pattern.clone());
        let result = match factory.fragment_smiles(&row.smiles) {
            Ok(records) => {
                debug!("Row {index} ({}): {} fragmentations", row.row_id, records.len());
                Ok(records)
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!("{}: {err}", row.row_id);
                Err(err.reason())
            }
        };
        Ok(FragmentOutcome { row, result })
    }

    fn cleanup(&self, index: usize) {
        trace!("Released row {index}");
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FragmentSummary {
    pub rows: usize,
    pub rejected: usize,
    pub fragments: usize,
}

/// Fragment every row of `input`, writing one row per record to `fragments`
/// and failed rows to `rejects`.
///
/// Output row keys are `{row_id}_{n}`, numbered per input row in record
/// order. Rows without an ID are written with their row id as ID, so their
/// records never pair with each other.
pub fn fragment_table<R, F, J>(
    config: &MmpConfig,
    cancel: &CancellationToken,
    input: R,
    fragments: F,
    rejects: J,
    mut correlation: Option<&mut CorrelationMap>,
) -> Result<FragmentSummary>
where
    R: Read + Send,
    F: Write,
    J: Write,
{
    config.validate()?;
    let pattern = Arc::new(config.fragmentation.bond_pattern.compile()?);
    info!("Fragmenting with {} bonds", pattern.pattern());

    let reader = InputReader::new(input, &config.table)?;
    let mut fragment_writer = FragmentWriter::new(fragments)?;
    let mut reject_writer = RejectWriter::new(rejects, reader.headers(), config.table.include_reject_reason)?;

    let task = FragmentTask {
        options: config.fragmentation.clone(),
        pattern,
    };
    let engine = BatchEngine::new(config.batch.clone(), cancel.clone());
    let mut summary = FragmentSummary::default();
    engine.run(&task, reader.rows(), |_, outcome| {
        summary.rows += 1;
        match outcome.result {
            Ok(records) => {
                let id = outcome.row.id.as_deref().unwrap_or(&outcome.row.row_id);
                for (n, record) in records.iter().enumerate() {
                    let row_key = format!("{}_{n}", outcome.row.row_id);
                    fragment_writer.write(&row_key, Some(id), record)?;
                    if let Some(map) = correlation.as_deref_mut() {
                        map.insert(&outcome.row.row_id, &row_key);
                    }
                }
                summary.fragments += records.len();
            }
            Err(reason) => {
                summary.rejected += 1;
                reject_writer.write(&outcome.row, &reason)?;
            }
        }
        Ok(())
    })?;
    fragment_writer.flush()?;
    reject_writer.flush()?;
    info!(
        "Fragmented {} rows into {} records, {} rejected",
        summary.rows, summary.fragments, summary.rejected
    );
    Ok(summary)
}

struct GroupTask<'a> {
    matcher: &'a PairMatcher,
    cancel: &'a CancellationToken,
}

impl RowTask for GroupTask<'_> {
    type Row = (String, Vec<PairCandidate>);
    type Output = (String, Vec<Transform>, PairingStats);

    fn compute(&self, _: usize, (parent, group): Self::Row) -> Result<Self::Output> {
        let (transforms, stats) = self.matcher.match_group(&group, self.cancel)?;
        Ok((parent, transforms, stats))
    }
}

struct TableTask<'a> {
    matcher: &'a PairMatcher,
    cancel: &'a CancellationToken,
    table: &'a [PairCandidate],
    row_keys: &'a [String],
}

impl RowTask for TableTask<'_> {
    type Row = usize;
    type Output = (String, Vec<Transform>, PairingStats);

    fn compute(&self, _: usize, row: usize) -> Result<Self::Output> {
        let (transforms, stats) = self.matcher.match_row(self.table, row, self.cancel)?;
        let parent = self.row_keys.get(row).cloned().unwrap_or_default();
        Ok((parent, transforms, stats))
    }
}

/// Pair every candidate with every other candidate sharing its Key.
///
/// `rows` pairs each candidate with the key of the fragment row it came
/// from. Transforms come back tagged with `{parent}_{n}` row keys, where the
/// parent is the row (or first row of the Key group) whose task produced
/// them.
pub fn pair_candidates(
    config: &MmpConfig,
    cancel: &CancellationToken,
    rows: Vec<(String, PairCandidate)>,
) -> Result<(Vec<(String, Transform)>, PairingStats)> {
    let matcher = PairMatcher::new(config.pairing.clone())?;
    let engine = BatchEngine::new(config.batch.clone(), cancel.clone());
    let mut output = Vec::new();
    let mut stats = PairingStats::default();
    let mut collect = |_: usize,
                       (parent, transforms, task_stats): (String, Vec<Transform>, PairingStats)|
     -> Result<()> {
        stats += task_stats;
        output.extend(
            transforms
                .into_iter()
                .enumerate()
                .map(|(n, transform)| (format!("{parent}_{n}"), transform)),
        );
        Ok(())
    };

    let (row_keys, candidates): (Vec<String>, Vec<PairCandidate>) = rows
        .into_iter()
        .map(|(row_key, candidate)| Ok((row_key, matcher.prepare(candidate)?)))
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .unzip();

    if config.pairing.sorted_by_key {
        let mut keys = row_keys.into_iter();
        let groups: Vec<(String, Vec<PairCandidate>)> = group_by_key(candidates)
            .into_iter()
            .map(|group| {
                let parent = keys.next().unwrap_or_default();
                for _ in 1..group.len() {
                    keys.next();
                }
                (parent, group)
            })
            .collect();
        info!("Pairing {} Key groups", groups.len());
        let task = GroupTask {
            matcher: &matcher,
            cancel,
        };
        engine.run(&task, groups, &mut collect)?;
    } else {
        info!("Pairing {} rows against the whole table", candidates.len());
        let task = TableTask {
            matcher: &matcher,
            cancel,
            table: &candidates,
            row_keys: &row_keys,
        };
        engine.run(&task, 0..candidates.len(), &mut collect)?;
        stats.groups = candidates
            .iter()
            .map(|c| &c.key)
            .collect::<BTreeSet<_>>()
            .len();
    }
    info!("{stats}");
    Ok((output, stats))
}

fn candidates_from_rows(rows: Vec<FragmentRow>) -> Vec<(String, PairCandidate)> {
    rows.into_iter()
        .filter_map(|row| {
            match PairCandidate::from_strings(&row.key, &row.value, row.id.clone()) {
                Ok(candidate) => Some((row.row_key, candidate)),
                Err(err) => {
                    warn!("Skipping fragment row {}: {err}", row.row_key);
                    None
                }
            }
        })
        .collect()
}

/// Read a fragment table and write every transform it contains.
pub fn pair_table<R: Read, W: Write>(
    config: &MmpConfig,
    cancel: &CancellationToken,
    fragments: R,
    transforms: W,
) -> Result<PairingStats> {
    config.validate()?;
    let rows = candidates_from_rows(read_fragment_rows(fragments)?);
    let (pairs, stats) = pair_candidates(config, cancel, rows)?;
    let mut writer = TransformWriter::new(transforms, &config.pairing)?;
    for (row_key, transform) in &pairs {
        writer.write(row_key, transform)?;
    }
    writer.flush()?;
    Ok(stats)
}

/// Fragment `input` and pair the results in memory.
pub fn run_table<R, T, J>(
    config: &MmpConfig,
    cancel: &CancellationToken,
    input: R,
    transforms: T,
    rejects: J,
) -> Result<(FragmentSummary, PairingStats)>
where
    R: Read + Send,
    T: Write,
    J: Write,
{
    let mut fragments = Vec::new();
    let summary = fragment_table(config, cancel, input, &mut fragments, rejects, None)?;
    let stats = pair_table(config, cancel, fragments.as_slice(), transforms)?;
    if cancel.is_cancelled() {
        return Err(MmpError::Cancelled);
    }
    Ok((summary, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canon::canonicalize_smiles;
    use crate::config::BatchOptions;
    use crate::pattern::BondPattern;

    const INPUT: &str = "smiles,id\n\
        CC(=O)Oc1ccccc1C(=O)O,aspirin\n\
        Oc1ccccc1C(=O)O,salicylic\n\
        C(,broken\n\
        c1ccccc1,benzene\n\
        Cc1ccccc1C(=O)O,toluic\n";

    fn config() -> MmpConfig {
        MmpConfig {
            fragmentation: FragmentationOptions {
                bond_pattern: BondPattern::AllAcyclicSingleBonds,
                ..Default::default()
            },
            batch: BatchOptions {
                threads: 3,
                queue_capacity: 2,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_fragment_table() {
        let mut fragments = Vec::new();
        let mut rejects = Vec::new();
        let mut correlation = CorrelationMap::new();
        let summary = fragment_table(
            &config(),
            &CancellationToken::new(),
            INPUT.as_bytes(),
            &mut fragments,
            &mut rejects,
            Some(&mut correlation),
        )
        .unwrap();
        assert_eq!(summary.rows, 5);
        assert_eq!(summary.rejected, 2);

        let rows = read_fragment_rows(fragments.as_slice()).unwrap();
        assert_eq!(rows.len(), summary.fragments);
        assert_eq!(rows[0].row_key, "Row0_0");
        assert!(rows.iter().any(|r| r.row_key == "Row4_0"));
        let aspirin: Vec<&FragmentRow> = rows.iter().filter(|r| r.row_key.starts_with("Row0_")).collect();
        assert_eq!(aspirin.len(), 10);
        assert_eq!(correlation.children("Row0").map(BTreeSet::len), Some(10));
        assert_eq!(correlation.parent("Row1_0"), Some("Row1"));

        let rejects = String::from_utf8(rejects).unwrap();
        let lines: Vec<&str> = rejects.lines().collect();
        assert_eq!(lines[0], "smiles,id,reason");
        assert_eq!(lines[1], "C(,broken,Could not parse");
        assert!(lines[2].starts_with("c1ccccc1,benzene,No valid fragmentation"));
    }

    #[test]
    fn test_fragment_output_is_deterministic() {
        let run = || {
            let mut fragments = Vec::new();
            fragment_table(
                &config(),
                &CancellationToken::new(),
                INPUT.as_bytes(),
                &mut fragments,
                std::io::sink(),
                None,
            )
            .unwrap();
            fragments
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_run_table_pairs_shared_keys() {
        let mut transforms = Vec::new();
        let (summary, stats) = run_table(
            &config(),
            &CancellationToken::new(),
            INPUT.as_bytes(),
            &mut transforms,
            std::io::sink(),
        )
        .unwrap();
        assert_eq!(summary.rows, 5);
        assert!(stats.transforms > 0);

        // Aspirin and salicylic acid share the salicyl Key: acetoxy vs hydroxy.
        let acetoxy = canonicalize_smiles("[1*]OC(C)=O").unwrap();
        let hydroxy = canonicalize_smiles("[1*]O").unwrap();
        let expected = format!("{acetoxy}>>{hydroxy}");
        let text = String::from_utf8(transforms).unwrap();
        assert!(text.lines().next().unwrap().starts_with("row_key,transformation"));
        assert!(text.lines().any(|line| line.contains(&expected)), "{text}");
        assert!(text.lines().any(|line| line.contains(&format!("{hydroxy}>>{acetoxy}"))));
    }

    #[test]
    fn test_rows_without_ids_use_row_ids() {
        let input = "smiles\nCC(=O)Oc1ccccc1C(=O)O\nOc1ccccc1C(=O)O\n";
        let mut fragments = Vec::new();
        fragment_table(
            &config(),
            &CancellationToken::new(),
            input.as_bytes(),
            &mut fragments,
            std::io::sink(),
            None,
        )
        .unwrap();
        let rows = read_fragment_rows(fragments.as_slice()).unwrap();
        assert!(rows
            .iter()
            .all(|r| r.id.as_deref() == r.row_key.split('_').next()));

        let (pairs, stats) =
            pair_candidates(&config(), &CancellationToken::new(), candidates_from_rows(rows)).unwrap();
        assert!(stats.transforms > 0);
        assert!(pairs.iter().all(|(_, t)| t.left_id() != t.right_id()));
    }

    #[test]
    fn test_sorted_and_whole_table_modes_agree() {
        let mut fragments = Vec::new();
        fragment_table(
            &config(),
            &CancellationToken::new(),
            INPUT.as_bytes(),
            &mut fragments,
            std::io::sink(),
            None,
        )
        .unwrap();
        let mut rows = read_fragment_rows(fragments.as_slice()).unwrap();
        rows.sort_by(|a, b| a.key.cmp(&b.key));

        let mut whole = config();
        whole.pairing.sorted_by_key = false;
        let mut sorted = config();
        sorted.pairing.sorted_by_key = true;
        let cancel = CancellationToken::new();
        let (a, a_stats) = pair_candidates(&whole, &cancel, candidates_from_rows(rows.clone())).unwrap();
        let (b, b_stats) = pair_candidates(&sorted, &cancel, candidates_from_rows(rows)).unwrap();
        let strip = |pairs: Vec<(String, Transform)>| -> BTreeSet<String> {
            pairs
                .into_iter()
                .map(|(_, t)| format!("{} {:?} {:?}", t.transformation(), t.left_id(), t.right_id()))
                .collect()
        };
        assert_eq!(a_stats.transforms, b_stats.transforms);
        assert_eq!(a_stats.groups, b_stats.groups);
        assert_eq!(strip(a), strip(b));
    }

    #[test]
    fn test_cancelled_run() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = fragment_table(
            &config(),
            &cancel,
            INPUT.as_bytes(),
            std::io::sink(),
            std::io::sink(),
            None,
        );
        assert!(matches!(result, Err(MmpError::Cancelled)));
    }

    #[test]
    fn test_invalid_configuration_is_fatal() {
        let mut config = config();
        config.fragmentation.max_cuts = 11;
        let result = fragment_table(
            &config,
            &CancellationToken::new(),
            INPUT.as_bytes(),
            std::io::sink(),
            std::io::sink(),
            None,
        );
        assert!(matches!(result, Err(MmpError::InvalidConfiguration(_))));
    }
}
