#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerCategory {
    pub name: &'static str,
    pub genes: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerTaxonomy {
    categories: &'static [MarkerCategory],
}

/// Common hepatic fibrosis markers.
pub const HEPATIC_FIBROSIS: MarkerTaxonomy = MarkerTaxonomy::new(&[
    MarkerCategory {
        name: "Classic",
        genes: &["Acta2", "Vim", "Col1a1", "Col3a1"],
    },
    MarkerCategory {
        name: "Inflammation",
        genes: &["Il6", "Tnfa", "Il4", "Il1b"],
    },
    MarkerCategory {
        name: "Signaling_Advanced",
        genes: &["Tem1", "Arrb1", "Gas6", "Axl", "Pdgfb"],
    },
    MarkerCategory {
        name: "Apoptosis",
        genes: &["Fas", "Fasl", "Bcl2", "Trp53"],
    },
    MarkerCategory {
        name: "Hedgehog",
        genes: &["Ptch1", "Smo"],
    },
]);

impl MarkerTaxonomy {
    pub const fn new(categories: &'static [MarkerCategory]) -> Self {
        Self { categories }
    }

    pub fn categories(&self) -> &'static [MarkerCategory] {
        self.categories
    }

    /// `(category, gene)` pairs in declaration order.
    pub fn pairs(&self) -> impl Iterator<Item = (&'static str, &'static str)> + use<> {
        let categories: &'static [MarkerCategory] = self.categories;
        categories
            .iter()
            .flat_map(|category| category.genes.iter().map(|gene| (category.name, *gene)))
    }

    pub fn len(&self) -> usize {
        self.categories.iter().map(|c| c.genes.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MarkerTaxonomy {
    fn default() -> Self {
        HEPATIC_FIBROSIS
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn panel_has_no_repeated_genes() {
        let genes = HEPATIC_FIBROSIS.pairs().map(|(_, g)| g).collect::<Vec<_>>();
        let unique = genes.iter().collect::<HashSet<_>>();
        assert_eq!(genes.len(), unique.len());
        assert_eq!(genes.len(), HEPATIC_FIBROSIS.len());
    }

    #[test]
    fn pairs_follow_declaration_order() {
        let first = HEPATIC_FIBROSIS.pairs().next().unwrap();
        assert_eq!(first, ("Classic", "Acta2"));
        let last = HEPATIC_FIBROSIS.pairs().last().unwrap();
        assert_eq!(last, ("Hedgehog", "Smo"));
    }
}
