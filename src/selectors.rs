use crate::editor::EditorError;
use crate::types::FieldSelector;

/// Which half of a selector row an update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorField {
    Name,
    Selector,
}

/// The DOM field-selector table. Rows are edited in place and may be left
/// half-filled; the rendered list always contains at least one row, so an
/// emptied table synthesizes a fresh blank.
#[derive(Debug)]
pub struct SelectorRows {
    rows: Vec<FieldSelector>,
}

impl Default for SelectorRows {
    fn default() -> Self {
        SelectorRows {
            rows: vec![FieldSelector::default()],
        }
    }
}

impl SelectorRows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<FieldSelector>) -> Self {
        if rows.is_empty() {
            Self::default()
        } else {
            SelectorRows { rows }
        }
    }

    pub fn rows(&self) -> &[FieldSelector] {
        &self.rows
    }

    pub fn add(&mut self, name: &str, selector: &str) {
        self.rows.push(FieldSelector {
            name: name.to_string(),
            selector: selector.to_string(),
        });
    }

    /// Append a blank row for the user to fill in.
    pub fn add_blank(&mut self) {
        self.rows.push(FieldSelector::default());
    }

    pub fn update(
        &mut self,
        index: usize,
        field: SelectorField,
        value: &str,
    ) -> Result<(), EditorError> {
        let row = self.rows.get_mut(index).ok_or(EditorError::Index {
            index,
            len: self.rows.len(),
        })?;
        match field {
            SelectorField::Name => row.name = value.to_string(),
            SelectorField::Selector => row.selector = value.to_string(),
        }
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<(), EditorError> {
        if index >= self.rows.len() {
            return Err(EditorError::Index {
                index,
                len: self.rows.len(),
            });
        }
        self.rows.remove(index);
        if self.rows.is_empty() {
            self.rows.push(FieldSelector::default());
        }
        Ok(())
    }

    /// Rows with both halves filled in — the ones that serialize.
    pub fn complete(&self) -> impl Iterator<Item = &FieldSelector> {
        self.rows.iter().filter(|r| r.is_complete())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_one_blank_row() {
        let rows = SelectorRows::new();
        assert_eq!(rows.rows().len(), 1);
        assert!(!rows.rows()[0].is_complete());
        assert_eq!(rows.complete().count(), 0);
    }

    #[test]
    fn update_edits_in_place() {
        let mut rows = SelectorRows::new();
        rows.update(0, SelectorField::Name, "title").unwrap();
        rows.update(0, SelectorField::Selector, "h2.title").unwrap();
        assert_eq!(rows.rows()[0].name, "title");
        assert_eq!(rows.rows()[0].selector, "h2.title");
        assert_eq!(rows.complete().count(), 1);

        assert_eq!(
            rows.update(4, SelectorField::Name, "x"),
            Err(EditorError::Index { index: 4, len: 1 })
        );
    }

    #[test]
    fn incomplete_rows_are_kept_but_not_serialized() {
        let mut rows = SelectorRows::new();
        rows.update(0, SelectorField::Name, "title").unwrap();
        rows.update(0, SelectorField::Selector, "h2").unwrap();
        rows.add("price", "");
        rows.add_blank();

        assert_eq!(rows.rows().len(), 3);
        let complete: Vec<_> = rows.complete().collect();
        assert_eq!(complete.len(), 1);
        assert_eq!(complete[0].name, "title");
    }

    #[test]
    fn removing_last_row_synthesizes_a_blank() {
        let mut rows = SelectorRows::new();
        rows.update(0, SelectorField::Name, "title").unwrap();
        rows.remove(0).unwrap();

        assert_eq!(rows.rows().len(), 1);
        assert_eq!(rows.rows()[0], FieldSelector::default());
    }

    #[test]
    fn remove_shifts_following_rows() {
        let mut rows = SelectorRows::with_rows(vec![
            FieldSelector { name: "a".into(), selector: "1".into() },
            FieldSelector { name: "b".into(), selector: "2".into() },
            FieldSelector { name: "c".into(), selector: "3".into() },
        ]);
        rows.remove(1).unwrap();
        assert_eq!(rows.rows()[1].name, "c");
        assert_eq!(rows.rows().len(), 2);
    }
}
