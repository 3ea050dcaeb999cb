//! Reporting several basis metabolites as one entry (e.g. `NAA+NAAG`).

use crate::error::{ConfigError, QuantifyError};
use crate::fit::{FitResult, MetabEntry};

pub fn combined_name(members: &[String]) -> String {
    members.join("+")
}

/// Add one combined entry per group.
///
/// Groups whose combined name already exists are skipped, so combining twice
/// leaves the result unchanged. All names are checked before anything is
/// modified. With `keep_components == false` the members are hidden.
pub fn combine(
    result: &mut FitResult,
    groups: &[Vec<String>],
    keep_components: bool,
) -> Result<(), QuantifyError> {
    let mut resolved = Vec::with_capacity(groups.len());
    for group in groups {
        let mut members = Vec::with_capacity(group.len());
        for name in group {
            let idx = result
                .metabolites
                .iter()
                .position(|m| m == name)
                .ok_or_else(|| ConfigError::UnknownCombineName(name.clone()))?;
            members.push(idx);
        }
        resolved.push((combined_name(group), members));
    }

    for (name, members) in resolved {
        if members.is_empty() || result.entry(&name).is_some() {
            continue;
        }
        if !keep_components {
            for entry in result.entries.iter_mut() {
                if entry.members.len() == 1 && members.contains(&entry.members[0]) {
                    entry.hidden = true;
                }
            }
        }
        result.entries.push(MetabEntry {
            name,
            members,
            hidden: false,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::synthetic::singlet_basis;
    use crate::domain::{Acquisition, Algorithm, LineshapeModel, MetabGroups, Scaling};
    use crate::fit::Convergence;
    use crate::models::SpectralModel;
    use nalgebra::DMatrix;

    fn result() -> FitResult {
        let acq = Acquisition::new(2000.0, 123.2);
        let basis = singlet_basis(&["NAA", "NAAG", "Cr"], 128, &acq).unwrap();
        let model = SpectralModel::new(
            &basis,
            &acq,
            MetabGroups::single(3),
            LineshapeModel::Lorentzian,
            None,
            (0.2, 4.2),
        )
        .unwrap();
        let mut params = vec![0.0; model.layout().len()];
        params[..3].copy_from_slice(&[2.0, 0.5, 1.0]);
        let data = model.predict(&params);
        let mut cov = DMatrix::zeros(params.len(), params.len());
        cov[(0, 0)] = 0.04;
        cov[(1, 1)] = 0.09;
        cov[(0, 1)] = -0.03;
        cov[(1, 0)] = -0.03;
        FitResult::from_model(
            &model,
            &data,
            params,
            cov,
            Algorithm::Newton,
            Convergence {
                converged: true,
                iterations: 1,
                acceptance_rate: None,
            },
        )
    }

    fn group() -> Vec<Vec<String>> {
        vec![vec!["NAA".to_string(), "NAAG".to_string()]]
    }

    #[test]
    fn combined_amplitude_and_sd() {
        let mut r = result();
        combine(&mut r, &group(), true).unwrap();
        assert_eq!(r.concentration("NAA+NAAG", Scaling::Raw), Some(2.5));
        // 0.04 + 0.09 - 2 * 0.03
        let sd = r.sd("NAA+NAAG", Scaling::Raw).unwrap();
        assert!((sd - 0.07f64.sqrt()).abs() < 1e-12);
        assert_eq!(r.visible_entries().count(), 4);
    }

    #[test]
    fn combining_twice_is_a_no_op() {
        let mut r = result();
        combine(&mut r, &group(), true).unwrap();
        let once = r.entries.clone();
        combine(&mut r, &group(), true).unwrap();
        assert_eq!(r.entries, once);
    }

    #[test]
    fn hiding_components() {
        let mut r = result();
        combine(&mut r, &group(), false).unwrap();
        let visible: Vec<&str> = r.visible_entries().map(|e| e.name.as_str()).collect();
        assert_eq!(visible, vec!["Cr", "NAA+NAAG"]);
        assert_eq!(r.concentration("NAA", Scaling::Raw), Some(2.0));
    }

    #[test]
    fn unknown_names_leave_result_untouched() {
        let mut r = result();
        let groups = vec![
            vec!["NAA".to_string(), "NAAG".to_string()],
            vec!["Cr".to_string(), "PCr".to_string()],
        ];
        let err = combine(&mut r, &groups, true).unwrap_err();
        assert_eq!(
            err,
            QuantifyError::Config(ConfigError::UnknownCombineName("PCr".into()))
        );
        assert_eq!(r.entries.len(), 3);
    }
}
