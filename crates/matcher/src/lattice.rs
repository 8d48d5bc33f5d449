//! Ordered match verdicts and range predicates over them.
//!
//! A [`MatchTypes`] descriptor is an explicit ordered table (rank → verdict)
//! plus the reverse lookup (verdict → rank). Every predicate in this module is
//! expressed on ranks alone, so any small enumeration of verdict levels can be
//! plugged in without the lattice knowing what the verdicts mean.
//!
//! A verdict missing from the descriptor has no rank. It sorts before every
//! concrete verdict, which is what callers want when filtering result sets
//! produced by an unrelated matcher.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::ops::Bound;
use std::str::FromStr;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::MatchError;
use crate::matcher::MatchTable;
use crate::result::MatchResult;

/// A single verdict level. The ordering lives in [`MatchTypes`], not here.
pub trait MatchType:
    Copy + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
}

/// Whether a range bound includes its endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoundType {
    /// Exclusive.
    Open,
    /// Inclusive.
    Closed,
}

/// Total order over a fixed set of verdicts, lowest first.
#[derive(Debug, Clone)]
pub struct MatchTypes<T: MatchType> {
    order: Arc<[T]>,
    ranks: Arc<HashMap<T, usize>>,
}

impl<T: MatchType> MatchTypes<T> {
    /// Build a descriptor from verdicts listed lowest to highest.
    ///
    /// The table must be non-empty and free of duplicates.
    pub fn new(order: impl IntoIterator<Item = T>) -> Result<Self, MatchError> {
        let order: Vec<T> = order.into_iter().collect();
        if order.is_empty() {
            return Err(MatchError::InvalidConfig(
                "match type table must not be empty".into(),
            ));
        }
        let mut ranks = HashMap::with_capacity(order.len());
        for (rank, verdict) in order.iter().enumerate() {
            if ranks.insert(*verdict, rank).is_some() {
                return Err(MatchError::InvalidConfig(format!(
                    "match type `{verdict}` listed twice"
                )));
            }
        }
        Ok(Self {
            order: order.into(),
            ranks: Arc::new(ranks),
        })
    }

    pub fn lowest(&self) -> T {
        self.order[0]
    }

    pub fn highest(&self) -> T {
        self.order[self.order.len() - 1]
    }

    /// The verdict ranked immediately above `t`, if any.
    pub fn next(&self, t: T) -> Option<T> {
        self.rank(&t).and_then(|r| self.order.get(r + 1).copied())
    }

    /// The verdict ranked immediately below `t`, if any.
    pub fn previous(&self, t: T) -> Option<T> {
        self.rank(&t)
            .and_then(|r| r.checked_sub(1))
            .map(|r| self.order[r])
    }

    /// Position of `t` in the table; `None` for foreign verdicts.
    pub fn rank(&self, t: &T) -> Option<usize> {
        self.ranks.get(t).copied()
    }

    pub fn contains(&self, t: &T) -> bool {
        self.ranks.contains_key(t)
    }

    /// Compare two verdicts; foreign verdicts sort first.
    pub fn compare(&self, a: &T, b: &T) -> Ordering {
        self.rank(a).cmp(&self.rank(b))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Verdicts from lowest to highest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = T> + '_ {
        self.order.iter().copied()
    }

    pub fn equal_to(&self, t: T) -> TypeRange<T> {
        let r = self.rank(&t);
        self.range(Bound::Included(r), Bound::Included(r))
    }

    pub fn greater_than(&self, t: T) -> TypeRange<T> {
        self.range(Bound::Excluded(self.rank(&t)), Bound::Unbounded)
    }

    pub fn lower_than(&self, t: T) -> TypeRange<T> {
        self.range(Bound::Unbounded, Bound::Excluded(self.rank(&t)))
    }

    pub fn greater_or_equal_to(&self, t: T) -> TypeRange<T> {
        self.range(Bound::Included(self.rank(&t)), Bound::Unbounded)
    }

    pub fn lower_or_equal_to(&self, t: T) -> TypeRange<T> {
        self.range(Bound::Unbounded, Bound::Included(self.rank(&t)))
    }

    /// Verdicts between `min` and `max`, each bound open or closed.
    pub fn within_range(
        &self,
        min: T,
        min_bound: BoundType,
        max: T,
        max_bound: BoundType,
    ) -> TypeRange<T> {
        self.range(
            to_bound(self.rank(&min), min_bound),
            to_bound(self.rank(&max), max_bound),
        )
    }

    /// `within_range(t, Closed, t, Closed)`.
    pub fn of_type(&self, t: T) -> TypeRange<T> {
        self.within_range(t, BoundType::Closed, t, BoundType::Closed)
    }

    /// `within_range(t, Closed, highest, Closed)`.
    pub fn at_least(&self, t: T) -> TypeRange<T> {
        self.within_range(t, BoundType::Closed, self.highest(), BoundType::Closed)
    }

    /// `within_range(lowest, Closed, t, Closed)`.
    pub fn at_most(&self, t: T) -> TypeRange<T> {
        self.within_range(self.lowest(), BoundType::Closed, t, BoundType::Closed)
    }

    fn range(&self, lower: Bound<Option<usize>>, upper: Bound<Option<usize>>) -> TypeRange<T> {
        TypeRange {
            types: self.clone(),
            lower,
            upper,
        }
    }
}

impl<T: MatchType> PartialEq for MatchTypes<T> {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order
    }
}

fn to_bound(rank: Option<usize>, kind: BoundType) -> Bound<Option<usize>> {
    match kind {
        BoundType::Open => Bound::Excluded(rank),
        BoundType::Closed => Bound::Included(rank),
    }
}

/// A predicate over verdicts, built from a [`MatchTypes`] descriptor.
#[derive(Debug, Clone)]
pub struct TypeRange<T: MatchType> {
    types: MatchTypes<T>,
    lower: Bound<Option<usize>>,
    upper: Bound<Option<usize>>,
}

impl<T: MatchType> TypeRange<T> {
    pub fn contains(&self, t: &T) -> bool {
        let rank = self.types.rank(t);
        let above = match self.lower {
            Bound::Included(l) => rank >= l,
            Bound::Excluded(l) => rank > l,
            Bound::Unbounded => true,
        };
        let below = match self.upper {
            Bound::Included(u) => rank <= u,
            Bound::Excluded(u) => rank < u,
            Bound::Unbounded => true,
        };
        above && below
    }

    pub fn accepts(&self, result: &MatchResult<T>) -> bool {
        self.contains(&result.match_type)
    }

    /// The entries of `table` whose verdict this range accepts.
    pub fn filter(&self, table: &MatchTable<T>) -> MatchTable<T> {
        table.filter(self)
    }

    /// The descriptor this range was built from.
    pub fn types(&self) -> &MatchTypes<T> {
        &self.types
    }

    /// Concrete verdicts accepted by this range, lowest first.
    pub fn verdicts(&self) -> Vec<T> {
        self.types.iter().filter(|t| self.contains(t)).collect()
    }
}

/// Logic-based verdicts for subsumption reasoning, lowest first:
/// `Fail < Subsume < Plugin < Exact`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicMatchType {
    /// No relation between the concepts.
    Fail,
    /// The offered concept is more general than the requested one.
    Subsume,
    /// The offered concept is more specific than the requested one.
    Plugin,
    /// The concepts are the same or declared equivalent.
    Exact,
}

static LOGIC_MATCH_TYPES: Lazy<MatchTypes<LogicMatchType>> = Lazy::new(|| MatchTypes {
    order: Arc::from(
        [
            LogicMatchType::Fail,
            LogicMatchType::Subsume,
            LogicMatchType::Plugin,
            LogicMatchType::Exact,
        ]
        .as_slice(),
    ),
    ranks: Arc::new(HashMap::from([
        (LogicMatchType::Fail, 0),
        (LogicMatchType::Subsume, 1),
        (LogicMatchType::Plugin, 2),
        (LogicMatchType::Exact, 3),
    ])),
});

impl LogicMatchType {
    /// Shared descriptor for the logic verdicts.
    pub fn types() -> MatchTypes<LogicMatchType> {
        LOGIC_MATCH_TYPES.clone()
    }

    /// Default confidence attached to each verdict.
    pub fn default_score(self) -> f64 {
        match self {
            LogicMatchType::Exact => 1.0,
            LogicMatchType::Plugin => 0.75,
            LogicMatchType::Subsume => 0.5,
            LogicMatchType::Fail => 0.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LogicMatchType::Exact => "exact",
            LogicMatchType::Plugin => "plugin",
            LogicMatchType::Subsume => "subsume",
            LogicMatchType::Fail => "fail",
        }
    }
}

impl MatchType for LogicMatchType {}

impl fmt::Display for LogicMatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogicMatchType {
    type Err = MatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(LogicMatchType::Exact),
            "plugin" => Ok(LogicMatchType::Plugin),
            "subsume" => Ok(LogicMatchType::Subsume),
            "fail" => Ok(LogicMatchType::Fail),
            other => Err(MatchError::InvalidConfig(format!(
                "unknown match type `{other}` (expected exact, plugin, subsume or fail)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use LogicMatchType::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Grade {
        Low,
        Mid,
        High,
        Unrelated,
    }

    impl fmt::Display for Grade {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl MatchType for Grade {}

    fn grades() -> MatchTypes<Grade> {
        MatchTypes::new([Grade::Low, Grade::Mid, Grade::High]).unwrap()
    }

    #[test]
    fn descriptor_navigation_stops_at_boundaries() {
        let types = LogicMatchType::types();
        assert_eq!(types.lowest(), Fail);
        assert_eq!(types.highest(), Exact);
        assert_eq!(types.next(Subsume), Some(Plugin));
        assert_eq!(types.next(Exact), None);
        assert_eq!(types.previous(Fail), None);
        assert_eq!(types.previous(Exact), Some(Plugin));
    }

    #[test]
    fn descriptor_rejects_empty_and_duplicate_tables() {
        assert!(MatchTypes::<Grade>::new([]).is_err());
        let err = MatchTypes::new([Grade::Low, Grade::Low]).unwrap_err();
        assert!(err.to_string().contains("listed twice"));
    }

    #[test]
    fn greater_than_accepts_exactly_the_higher_levels() {
        let types = LogicMatchType::types();
        let all: Vec<_> = types.iter().collect();
        for pair in all.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let range = types.greater_than(a);
            for t in types.iter() {
                assert_eq!(
                    range.contains(&t),
                    types.compare(&t, &a) == Ordering::Greater,
                    "greater_than({a}) on {t}"
                );
            }
            assert!(range.contains(&b));
        }
    }

    #[test]
    fn within_range_open_closed_is_half_open_interval() {
        let types = LogicMatchType::types();
        let range = types.within_range(Subsume, BoundType::Open, Exact, BoundType::Closed);
        assert_eq!(range.verdicts(), vec![Plugin, Exact]);

        let closed_open = types.within_range(Fail, BoundType::Closed, Plugin, BoundType::Open);
        assert_eq!(closed_open.verdicts(), vec![Fail, Subsume]);
    }

    #[test]
    fn union_variants_include_endpoint() {
        let types = LogicMatchType::types();
        assert_eq!(types.greater_or_equal_to(Plugin).verdicts(), vec![Plugin, Exact]);
        assert_eq!(types.lower_or_equal_to(Subsume).verdicts(), vec![Fail, Subsume]);
        assert_eq!(types.lower_than(Subsume).verdicts(), vec![Fail]);
        assert_eq!(types.equal_to(Plugin).verdicts(), vec![Plugin]);
    }

    #[test]
    fn extreme_specializations_cover_lattice() {
        let types = LogicMatchType::types();
        assert_eq!(types.at_least(types.lowest()).verdicts().len(), types.len());
        assert_eq!(types.at_most(types.highest()).verdicts().len(), types.len());
        assert_eq!(types.of_type(Subsume).verdicts(), vec![Subsume]);
    }

    #[test]
    fn predicates_work_for_any_plugged_in_order() {
        let types = grades();
        assert_eq!(types.greater_than(Grade::Low).verdicts(), vec![Grade::Mid, Grade::High]);
        assert_eq!(types.at_most(Grade::Mid).verdicts(), vec![Grade::Low, Grade::Mid]);
    }

    #[test]
    fn foreign_verdicts_sort_before_all_concrete_ones() {
        let types = grades();
        assert_eq!(types.rank(&Grade::Unrelated), None);
        assert_eq!(types.compare(&Grade::Unrelated, &Grade::Low), Ordering::Less);
        assert!(types.lower_than(Grade::Low).contains(&Grade::Unrelated));
        assert!(!types.greater_or_equal_to(Grade::Low).contains(&Grade::Unrelated));
        assert!(!types.at_least(Grade::Low).contains(&Grade::Unrelated));
    }

    #[test]
    fn logic_match_type_parses_case_insensitively() {
        assert_eq!("PLUGIN".parse::<LogicMatchType>().unwrap(), Plugin);
        assert!("partial".parse::<LogicMatchType>().is_err());
        assert_eq!(Exact.to_string(), "exact");
    }
}
