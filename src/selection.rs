use crate::error::KiraError;
use crate::prompt::{Choice, Prompter, prompt_indices};
use crate::table::Table;

pub const COLUMN_ESCAPE: &str = "m";
const DEFAULT_GROUP_COLUMN: &str = "title";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    pub files: Vec<usize>,
    pub column: Option<String>,
    pub groups: Vec<String>,
}

pub fn select_files(
    prompter: &mut dyn Prompter,
    candidates: &[String],
) -> Result<Vec<usize>, KiraError> {
    prompter.heading("--- candidate matrix files ---")?;
    for (i, url) in candidates.iter().enumerate() {
        prompter.show(&format!("[{i}] {}", file_name_from_url(url)))?;
    }
    match prompt_indices(
        prompter,
        "enter the matrix indices to download (e.g. 1:8,11): ",
        candidates.len(),
        None,
    )? {
        Choice::Indices(indices) => Ok(indices),
        Choice::Escape(token) => Err(KiraError::InvalidSelection(format!(
            "unexpected escape token {token}"
        ))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupState {
    SelectingColumn,
    SelectingGroups,
}

/// Narrows `meta` to the sample groups the operator picks.
///
/// Starts on the `title` column (or the first column) and lets the operator type `m` to switch
/// to another column. Switching columns starts group selection over. Returns the filtered table
/// and records the column and groups in `state`.
pub fn select_groups(
    prompter: &mut dyn Prompter,
    meta: &Table,
    state: &mut SelectionState,
) -> Result<Table, KiraError> {
    let columns = meta.column_names().map(str::to_string).collect::<Vec<_>>();
    let Some(first) = columns.first() else {
        return Err(KiraError::InvalidSelection(
            "sample metadata has no columns".to_string(),
        ));
    };
    let mut column = if columns.iter().any(|c| c == DEFAULT_GROUP_COLUMN) {
        DEFAULT_GROUP_COLUMN.to_string()
    } else {
        first.clone()
    };

    let mut phase = GroupState::SelectingGroups;
    loop {
        match phase {
            GroupState::SelectingGroups => {
                let groups = meta.unique_values(&column);
                prompter.heading(&format!(
                    "--- column [{column}] holds these sample descriptions ---"
                ))?;
                for (i, group) in groups.iter().enumerate() {
                    prompter.show(&format!("[{i}] {group}"))?;
                }
                let choice = prompt_indices(
                    prompter,
                    "enter the group indices to keep (e.g. 1:8,11, 'm' to pick another column): ",
                    groups.len(),
                    Some(COLUMN_ESCAPE),
                )?;
                match choice {
                    Choice::Escape(_) => phase = GroupState::SelectingColumn,
                    Choice::Indices(indices) => {
                        let chosen = indices
                            .into_iter()
                            .map(|i| groups[i].clone())
                            .collect::<Vec<_>>();
                        let filtered = meta.filter_by_values(&column, &chosen);
                        state.column = Some(column);
                        state.groups = chosen;
                        return Ok(filtered);
                    }
                }
            }
            GroupState::SelectingColumn => {
                prompter.heading("--- metadata columns ---")?;
                for (i, name) in columns.iter().enumerate() {
                    prompter.show(&format!("[{i}] {name}"))?;
                }
                let choice = prompt_indices(
                    prompter,
                    "pick the column that describes the sample groups: ",
                    columns.len(),
                    None,
                )?;
                if let Choice::Indices(indices) = choice {
                    if let Some(&i) = indices.first() {
                        column = columns[i].clone();
                    }
                }
                phase = GroupState::SelectingGroups;
            }
        }
    }
}

pub fn file_name_from_url(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}
