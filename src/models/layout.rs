//! Parameter vector layout.
//!
//! ```text
//! [ amplitudes (M) | gamma (G) | sigma (G, Voigt only) | eps (G) | Phi0 | Phi1 | baseline (2(order+1)) ]
//! ```

use std::ops::Range;

use crate::domain::LineshapeModel;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamLayout {
    pub n_metabs: usize,
    pub n_groups: usize,
    pub lineshape: LineshapeModel,
    pub baseline_order: Option<usize>,
}

#[allow(clippy::len_without_is_empty)]
impl ParamLayout {
    pub fn new(
        n_metabs: usize,
        n_groups: usize,
        lineshape: LineshapeModel,
        baseline_order: Option<usize>,
    ) -> Self {
        Self {
            n_metabs,
            n_groups,
            lineshape,
            baseline_order,
        }
    }

    pub fn len(&self) -> usize {
        self.phi1() + 1 + self.baseline_len()
    }

    pub fn amplitudes(&self) -> Range<usize> {
        0..self.n_metabs
    }

    pub fn gamma(&self, group: usize) -> usize {
        self.n_metabs + group
    }

    pub fn sigma(&self, group: usize) -> Option<usize> {
        match self.lineshape {
            LineshapeModel::Lorentzian => None,
            LineshapeModel::Voigt => Some(self.n_metabs + self.n_groups + group),
        }
    }

    pub fn eps(&self, group: usize) -> usize {
        self.n_metabs + self.n_groups * self.lineshape.broadening_len() + group
    }

    pub fn phi0(&self) -> usize {
        self.n_metabs + self.n_groups * (self.lineshape.broadening_len() + 1)
    }

    pub fn phi1(&self) -> usize {
        self.phi0() + 1
    }

    pub fn baseline_len(&self) -> usize {
        self.baseline_order.map_or(0, |order| 2 * (order + 1))
    }

    pub fn baseline(&self) -> Range<usize> {
        let start = self.phi1() + 1;
        start..start + self.baseline_len()
    }

    /// Parameters that are physically non-negative (amplitudes and widths).
    pub fn is_non_negative(&self, idx: usize) -> bool {
        if idx < self.n_metabs {
            return true;
        }
        let widths_end = self.n_metabs + self.n_groups * self.lineshape.broadening_len();
        idx < widths_end
    }

    /// Clamp non-negative parameters in place.
    pub fn project(&self, params: &mut [f64]) {
        for (i, p) in params.iter_mut().enumerate() {
            if self.is_non_negative(i) && *p < 0.0 {
                *p = 0.0;
            }
        }
    }

    pub fn names(&self, metabolites: &[String]) -> Vec<String> {
        let mut out = Vec::with_capacity(self.len());
        out.extend(metabolites.iter().cloned());
        out.extend((0..self.n_groups).map(|g| format!("gamma_{g}")));
        if self.lineshape == LineshapeModel::Voigt {
            out.extend((0..self.n_groups).map(|g| format!("sigma_{g}")));
        }
        out.extend((0..self.n_groups).map(|g| format!("eps_{g}")));
        out.push("Phi0".to_string());
        out.push("Phi1".to_string());
        if let Some(order) = self.baseline_order {
            for p in 0..=order {
                out.push(format!("B_real_{p}"));
                out.push(format!("B_imag_{p}"));
            }
        }
        out
    }

    /// Index of the real and imaginary coefficient of baseline power `p`.
    pub fn baseline_pair(&self, power: usize) -> (usize, usize) {
        let start = self.baseline().start + 2 * power;
        (start, start + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lorentzian_layout() {
        let layout = ParamLayout::new(3, 2, LineshapeModel::Lorentzian, Some(1));
        assert_eq!(layout.gamma(1), 4);
        assert_eq!(layout.sigma(0), None);
        assert_eq!(layout.eps(0), 5);
        assert_eq!(layout.phi0(), 7);
        assert_eq!(layout.baseline(), 9..13);
        assert_eq!(layout.len(), 13);
        let names = layout.names(&["A".into(), "B".into(), "C".into()]);
        assert_eq!(names.len(), layout.len());
        assert_eq!(names[5], "eps_0");
        assert_eq!(names[12], "B_imag_1");
    }

    #[test]
    fn voigt_layout_and_bounds() {
        let layout = ParamLayout::new(2, 1, LineshapeModel::Voigt, None);
        assert_eq!(layout.sigma(0), Some(3));
        assert_eq!(layout.eps(0), 4);
        assert_eq!(layout.len(), 7);
        assert!(layout.is_non_negative(3));
        assert!(!layout.is_non_negative(4));

        let mut p = vec![-1.0, 1.0, -2.0, -3.0, -4.0, -5.0, -6.0];
        layout.project(&mut p);
        assert_eq!(p, vec![0.0, 1.0, 0.0, 0.0, -4.0, -5.0, -6.0]);
    }

    #[test]
    fn len_covers_every_parameter() {
        for baseline in [None, Some(0), Some(2)] {
            let layout = ParamLayout::new(1, 1, LineshapeModel::Lorentzian, baseline);
            let last = if baseline.is_some() {
                layout.baseline().end
            } else {
                layout.phi1() + 1
            };
            assert_eq!(layout.len(), last);
            assert!(layout.len() >= 5);
        }
    }
}
