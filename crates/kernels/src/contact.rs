use crate::errors::{KernelError, Result};
use crate::Kernel;
use linfa::Float;
use log::warn;
use ndarray::{Array2, ArrayBase, Data, Ix1, Ix2};
#[cfg(feature = "serializable")]
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

/// A structural contact hypothesis: `first.0` holds `first.1` while
/// `second.0` holds `second.1`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct ContactTerm<A> {
    /// (position, symbol) literal of the first residue
    pub first: (usize, A),
    /// (position, symbol) literal of the second residue
    pub second: (usize, A),
}

impl<A: PartialEq> ContactTerm<A> {
    /// Whether both literals of the term hold in `item`
    pub fn is_satisfied_by(&self, item: &ArrayBase<impl Data<Elem = A>, Ix1>) -> bool {
        let holds = |(pos, sym): &(usize, A)| item.get(*pos).is_some_and(|s| s == sym);
        holds(&self.first) && holds(&self.second)
    }
}

/// Structure kernel
///
/// `k(s1, s2) = var * #{ contact terms satisfied by both s1 and s2 }`
///
/// Contact terms are enumerated once at construction as the cross product
/// of the alphabets of the two positions of every contact. The indices of
/// the terms satisfied by each training item are cached by [Kernel::fit];
/// items missing from the cache are evaluated on the fly.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serializable", derive(Serialize, Deserialize))]
pub struct ContactKernel<A> {
    terms: Vec<ContactTerm<A>>,
    #[cfg_attr(feature = "serializable", serde(skip))]
    cache: HashMap<Vec<A>, Vec<usize>>,
}

impl<A: Clone + Eq + Hash> ContactKernel<A> {
    /// Build the kernel from the list of contacting position pairs
    /// and the alphabet (possible symbols) of every position.
    pub fn new(contacts: &[(usize, usize)], alphabets: &[Vec<A>]) -> Result<Self> {
        let mut terms = vec![];
        for &(p1, p2) in contacts {
            let alphabet = |pos: usize| {
                alphabets.get(pos).map(|a| unique(a)).ok_or_else(|| {
                    KernelError::InvalidValueError(format!(
                        "contact ({p1}, {p2}) refers to position {pos} while only {} alphabets are given",
                        alphabets.len()
                    ))
                })
            };
            let (firsts, seconds) = (alphabet(p1)?, alphabet(p2)?);
            for a1 in firsts.iter() {
                for a2 in seconds.iter() {
                    terms.push(ContactTerm {
                        first: (p1, a1.clone()),
                        second: (p2, a2.clone()),
                    });
                }
            }
        }
        Ok(ContactKernel {
            terms,
            cache: HashMap::new(),
        })
    }

    /// All contact terms in enumeration order
    pub fn terms(&self) -> &[ContactTerm<A>] {
        &self.terms
    }

    /// Number of cached items
    pub fn n_cached(&self) -> usize {
        self.cache.len()
    }

    /// Indices of the terms satisfied by `item`, cached or computed
    pub fn contacts(&self, item: &ArrayBase<impl Data<Elem = A>, Ix1>) -> Cow<'_, [usize]> {
        match self.cache.get(&item.to_vec()) {
            Some(found) => Cow::Borrowed(found.as_slice()),
            None => Cow::Owned(self.satisfied(item)),
        }
    }

    /// (n, n_terms) indicator matrix: 1 where the item satisfies the term
    pub fn contacts_matrix<F: Float>(&self, x: &ArrayBase<impl Data<Elem = A>, Ix2>) -> Array2<F> {
        let mut indicators = Array2::zeros((x.nrows(), self.terms.len()));
        for (mut row, item) in indicators.rows_mut().into_iter().zip(x.rows()) {
            for &t in self.contacts(&item).iter() {
                row[t] = F::one();
            }
        }
        indicators
    }

    fn satisfied(&self, item: &ArrayBase<impl Data<Elem = A>, Ix1>) -> Vec<usize> {
        self.terms
            .iter()
            .enumerate()
            .filter(|(_, term)| term.is_satisfied_by(item))
            .map(|(i, _)| i)
            .collect()
    }
}

/// Symbols in first occurrence order without repetition
fn unique<A: Clone + Eq + Hash>(symbols: &[A]) -> Vec<A> {
    let mut seen = HashSet::new();
    symbols
        .iter()
        .filter(|s| seen.insert(*s))
        .cloned()
        .collect()
}

impl<A> fmt::Display for ContactKernel<A> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Contact({} terms)", self.terms.len())
    }
}

impl<F, A> Kernel<F> for ContactKernel<A>
where
    F: Float,
    A: Clone + Eq + Hash + fmt::Debug + Send + Sync,
{
    type Elem = A;

    fn fit(&mut self, x: &ArrayBase<impl Data<Elem = A>, Ix2>) -> usize {
        // one cache generation per training call
        self.cache.clear();
        for item in x.rows() {
            let satisfied = self.satisfied(&item);
            match self.cache.entry(item.to_vec()) {
                Entry::Occupied(_) => {
                    warn!("Attempting to rewrite contacts for {:?}", item.to_vec())
                }
                Entry::Vacant(slot) => {
                    slot.insert(satisfied);
                }
            }
        }
        <Self as Kernel<F>>::n_hypers(self)
    }

    fn n_hypers(&self) -> usize {
        1
    }

    fn cov(
        &self,
        xa: &ArrayBase<impl Data<Elem = A>, Ix2>,
        xb: &ArrayBase<impl Data<Elem = A>, Ix2>,
        hypers: &ArrayBase<impl Data<Elem = F>, Ix1>,
    ) -> Array2<F> {
        let ca = self.contacts_matrix::<F>(xa);
        let cb = self.contacts_matrix::<F>(xb);
        ca.dot(&cb.t()) * hypers[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::tests::assert_symmetric_psd;
    use approx::assert_abs_diff_eq;
    use ndarray::{arr1, array, Array2};

    fn seqs(items: &[&str]) -> Array2<char> {
        let len = items[0].len();
        let flat: Vec<char> = items.iter().flat_map(|s| s.chars()).collect();
        Array2::from_shape_vec((items.len(), len), flat).unwrap()
    }

    fn kernel() -> ContactKernel<char> {
        let alphabets = vec![vec!['A', 'B'], vec!['C', 'D', 'C'], vec!['E', 'F']];
        ContactKernel::new(&[(0, 1), (1, 2)], &alphabets).unwrap()
    }

    #[test]
    fn test_contact_terms() {
        let kern = kernel();
        // duplicated 'C' only counts once
        assert_eq!(kern.terms().len(), 8);
        assert_eq!(
            kern.terms()[0],
            ContactTerm {
                first: (0, 'A'),
                second: (1, 'C')
            }
        );
        assert_eq!(
            kern.terms()[7],
            ContactTerm {
                first: (1, 'D'),
                second: (2, 'F')
            }
        );
    }

    #[test]
    fn test_bad_contact() {
        let res = ContactKernel::new(&[(0, 3)], &[vec!['A'], vec!['B']]);
        assert!(matches!(res, Err(KernelError::InvalidValueError(_))));
    }

    #[test]
    fn test_term_satisfaction() {
        let term = ContactTerm {
            first: (0, 'A'),
            second: (2, 'F'),
        };
        assert!(term.is_satisfied_by(&arr1(&['A', 'C', 'F'])));
        assert!(!term.is_satisfied_by(&arr1(&['A', 'C', 'E'])));
        assert!(!term.is_satisfied_by(&arr1(&['B', 'C', 'F'])));
    }

    #[test]
    fn test_contact_cov() {
        let x = seqs(&["ACE", "ADF", "BCE"]);
        let kern = kernel();
        let k = kern.self_cov(&x, &array![1.0]);
        // every item satisfies exactly one term per contact
        assert_abs_diff_eq!(k.diag().to_owned(), array![2., 2., 2.]);
        // ACE and BCE share (C, E) only
        assert_abs_diff_eq!(k[[0, 2]], 1.);
        assert_abs_diff_eq!(k[[0, 1]], 0.);
        assert_abs_diff_eq!(kern.cov(&x, &seqs(&["ACE"]), &array![3.0])[[0, 0]], 6.);
        assert_symmetric_psd(&k);
    }

    #[test]
    fn test_cache_generation() {
        let x = seqs(&["ACE", "ADF", "ACE"]);
        let mut kern = kernel();
        assert_eq!(Kernel::<f64>::fit(&mut kern, &x), 1);
        // duplicated item is registered once
        assert_eq!(kern.n_cached(), 2);
        let item = x.row(0);
        assert!(matches!(kern.contacts(&item), Cow::Borrowed(_)));
        assert_eq!(kern.contacts(&item).to_vec(), vec![0, 4]);

        // unknown item is computed without polluting the cache
        let other = arr1(&['B', 'D', 'F']);
        assert!(matches!(kern.contacts(&other), Cow::Owned(_)));
        assert_eq!(kern.contacts(&other).to_vec(), vec![3, 7]);
        assert_eq!(kern.n_cached(), 2);

        // a new training call starts a new generation
        Kernel::<f64>::fit(&mut kern, &seqs(&["BDF"]));
        assert_eq!(kern.n_cached(), 1);
        assert!(matches!(kern.contacts(&item), Cow::Owned(_)));
    }

    #[cfg(feature = "serializable")]
    #[test]
    fn test_serde_skips_cache() {
        let mut kern = kernel();
        Kernel::<f64>::fit(&mut kern, &seqs(&["ACE", "ADF"]));
        let json = serde_json::to_string(&kern).unwrap();
        let loaded: ContactKernel<char> = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.terms(), kern.terms());
        assert_eq!(loaded.n_cached(), 0);
    }
}
