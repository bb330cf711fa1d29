//! Composition building blocks
//!
//! Reducers, middleware and async action creators compose by concatenation
//! (`Monoid`) and can be lifted from a part of the state/action onto the
//! whole through a `Lens` (state) and a `Prism` (action).

/// Associative concatenation with an identity element
///
/// Implementations must satisfy `empty().combine(x) == x == x.combine(empty())`
/// and `a.combine(b).combine(c) == a.combine(b.combine(c))` behaviourally.
pub trait Monoid: Sized {
    fn empty() -> Self;

    fn combine(self, other: Self) -> Self;

    /// Fold any number of values left to right
    fn concat<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Self>,
    {
        items.into_iter().fold(Self::empty(), Self::combine)
    }
}

/// Focus on a part `S` of a whole state `T`
pub struct Lens<T, S> {
    get: fn(&T) -> &S,
    get_mut: fn(&mut T) -> &mut S,
}

impl<T, S> Clone for Lens<T, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, S> Copy for Lens<T, S> {}

impl<T, S> Lens<T, S> {
    pub const fn new(get: fn(&T) -> &S, get_mut: fn(&mut T) -> &mut S) -> Self {
        Self { get, get_mut }
    }

    pub fn get<'a>(&self, whole: &'a T) -> &'a S {
        (self.get)(whole)
    }

    pub fn get_mut<'a>(&self, whole: &'a mut T) -> &'a mut S {
        (self.get_mut)(whole)
    }
}

/// Partial extraction of an action `A` out of a larger action `B`, with total injection back
///
/// Typically `B` is an enum and `A` the payload of one of its variants:
///
/// ```
/// use uniflow::Prism;
///
/// enum AppAction {
///     Counter(CounterAction),
///     Reset,
/// }
/// enum CounterAction {
///     Add(i64),
/// }
///
/// fn counter(action: &AppAction) -> Option<&CounterAction> {
///     match action {
///         AppAction::Counter(inner) => Some(inner),
///         _ => None,
///     }
/// }
///
/// let prism = Prism::new(counter, AppAction::Counter);
/// assert!(prism.preview(&AppAction::Reset).is_none());
/// ```
pub struct Prism<B, A> {
    preview: fn(&B) -> Option<&A>,
    review: fn(A) -> B,
}

impl<B, A> Clone for Prism<B, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B, A> Copy for Prism<B, A> {}

impl<B, A> Prism<B, A> {
    pub const fn new(preview: fn(&B) -> Option<&A>, review: fn(A) -> B) -> Self {
        Self { preview, review }
    }

    /// The inner action, if `action` carries one
    pub fn preview<'a>(&self, action: &'a B) -> Option<&'a A> {
        (self.preview)(action)
    }

    /// Inject an inner action into the outer type
    pub fn review(&self, action: A) -> B {
        (self.review)(action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Whole {
        count: u32,
    }

    #[derive(Debug, PartialEq)]
    enum Outer {
        Inner(u32),
        Other,
    }

    fn count(whole: &Whole) -> &u32 {
        &whole.count
    }

    fn count_mut(whole: &mut Whole) -> &mut u32 {
        &mut whole.count
    }

    fn inner(action: &Outer) -> Option<&u32> {
        match action {
            Outer::Inner(n) => Some(n),
            Outer::Other => None,
        }
    }

    #[test]
    fn test_lens_reads_and_writes_the_part() {
        let lens = Lens::new(count, count_mut);
        let mut whole = Whole { count: 1 };

        *lens.get_mut(&mut whole) += 1;

        assert_eq!(*lens.get(&whole), 2);
    }

    #[test]
    fn test_prism_preview_and_review() {
        let prism = Prism::new(inner, Outer::Inner);

        assert_eq!(prism.preview(&Outer::Inner(3)), Some(&3));
        assert_eq!(prism.preview(&Outer::Other), None);
        assert_eq!(prism.review(5), Outer::Inner(5));
    }

    #[derive(Debug, PartialEq)]
    struct Text(String);

    impl Monoid for Text {
        fn empty() -> Self {
            Text(String::new())
        }

        fn combine(self, other: Self) -> Self {
            Text(self.0 + &other.0)
        }
    }

    #[test]
    fn test_concat_folds_left_to_right() {
        let joined = Text::concat(["a", "b", "c"].map(|s| Text(s.to_string())));
        assert_eq!(joined, Text("abc".to_string()));
        assert_eq!(Text::concat(Vec::new()), Text::empty());
    }
}
