//! Row reordering for tables with a self-referencing foreign key.
//!
//! Rows are sorted so that, inserted one by one with constraints enabled,
//! no row arrives before the row its parent column points to.

use super::graph::topo_sort;
use crate::error::{NormalizeError, Result};
use ahash::AHashMap;
use csv::{ByteRecord, QuoteStyle, ReaderBuilder, WriterBuilder};
use std::fs;
use std::hash::Hash;
use std::path::Path;

/// Reorder rows by a `(child, parent)` key pair.
///
/// Empty parent values and rows that are their own parent carry no
/// dependency. Parent values that match no row are ignored. Rows caught in
/// a cycle are emitted after all orderable rows, in their original order.
/// The sort is stable, so rows sharing a child value keep their order.
pub fn reorder_by_parent<R, K, F>(rows: Vec<R>, key: F) -> Vec<R>
where
    K: AsRef<[u8]> + Eq + Hash + ?Sized,
    F: Fn(&R) -> (&K, &K),
{
    let ranks: Vec<usize> = {
        let mut index: AHashMap<&K, usize> = AHashMap::new();
        for row in &rows {
            let (child, _) = key(row);
            let next = index.len();
            index.entry(child).or_insert(next);
        }

        let mut parents: Vec<Vec<usize>> = vec![Vec::new(); index.len()];
        for row in &rows {
            let (child, parent) = key(row);
            if parent.as_ref().is_empty() || parent == child {
                continue;
            }
            if let (Some(&c), Some(&p)) = (index.get(child), index.get(parent)) {
                if !parents[c].contains(&p) {
                    parents[c].push(p);
                }
            }
        }

        let result = topo_sort(&parents);
        let mut rank = vec![usize::MAX; parents.len()];
        for (pos, node) in result.order.iter().chain(result.cyclic.iter()).enumerate() {
            rank[*node] = pos;
        }

        rows.iter()
            .map(|row| index.get(key(row).0).map_or(usize::MAX, |&i| rank[i]))
            .collect()
    };

    let mut keyed: Vec<(usize, R)> = ranks.into_iter().zip(rows).collect();
    keyed.sort_by_key(|(r, _)| *r);
    keyed.into_iter().map(|(_, row)| row).collect()
}

/// Reorder TSV records by the values in two columns.
///
/// Key fields are compared as raw bytes, so records need not be UTF-8.
pub fn reorder_self_referencing(
    rows: Vec<ByteRecord>,
    child_column: usize,
    parent_column: usize,
) -> Vec<ByteRecord> {
    reorder_by_parent(rows, |row: &ByteRecord| {
        (
            row.get(child_column).unwrap_or_default(),
            row.get(parent_column).unwrap_or_default(),
        )
    })
}

/// Decode a header row for column lookup, dropping a leading BOM
pub fn decode_headers(headers: &ByteRecord) -> Vec<String> {
    headers
        .iter()
        .map(|h| {
            let name = String::from_utf8_lossy(h);
            name.trim_start_matches('\u{feff}').trim().to_string()
        })
        .collect()
}

/// Find a header column by any of its candidate names (case-insensitive)
pub fn find_column(headers: &[String], candidates: &[&str]) -> Option<usize> {
    candidates
        .iter()
        .find_map(|name| headers.iter().position(|h| h.eq_ignore_ascii_case(name)))
}

/// Rewrite a TSV data file with its rows in load-safe order.
///
/// The header row is kept first; columns are located by any of the given
/// names. Returns the number of data rows written.
pub fn reorder_tsv_file(path: &Path, child: &[&str], parent: &[&str]) -> Result<usize> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .quoting(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| NormalizeError::tsv(path, e))?;

    let headers = reader
        .byte_headers()
        .map_err(|e| NormalizeError::tsv(path, e))?
        .clone();
    let names = decode_headers(&headers);
    let locate = |candidates: &[&str]| {
        find_column(&names, candidates).ok_or_else(|| NormalizeError::MissingTsvColumn {
            path: path.to_path_buf(),
            column: candidates.join("/"),
        })
    };
    let child_idx = locate(child)?;
    let parent_idx = locate(parent)?;

    let rows = reader
        .byte_records()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| NormalizeError::tsv(path, e))?;
    let count = rows.len();
    let ordered = reorder_self_referencing(rows, child_idx, parent_idx);

    let tmp_path = path.with_extension("tsv.tmp");
    {
        let mut writer = WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(QuoteStyle::Never)
            .flexible(true)
            .from_path(&tmp_path)
            .map_err(|e| NormalizeError::tsv(&tmp_path, e))?;
        writer
            .write_record(&headers)
            .map_err(|e| NormalizeError::tsv(&tmp_path, e))?;
        for row in &ordered {
            writer
                .write_record(row)
                .map_err(|e| NormalizeError::tsv(&tmp_path, e))?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp_path, path)?;

    Ok(count)
}
