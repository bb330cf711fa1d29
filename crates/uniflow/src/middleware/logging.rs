use crate::dispatcher::{Dispatch, GetState};
use crate::middleware::{Middleware, Teardown};
use log::Level;
use std::fmt::Debug;

/// Middleware that logs every action passing through, then always calls `next`
pub fn logging<S: 'static, A: Debug + 'static>(level: Level) -> Middleware<S, A> {
    Middleware::new(move |_: Dispatch<A>, _: GetState<S>, _: &Teardown| {
        move |action: A, next: &dyn Fn(A)| {
            log::log!(level, "Action: {:?}", action);
            next(action)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_logging_passes_action_through() {
        let teardown = Teardown::new();
        let middleware = logging::<(), u32>(Level::Debug);
        let interceptor = middleware.instantiate(Dispatch::new(|_| {}), GetState::new(|| ()), &teardown);

        let reached = RefCell::new(Vec::new());
        interceptor(7, &|action| reached.borrow_mut().push(action));
        interceptor(8, &|action| reached.borrow_mut().push(action));

        assert_eq!(reached.into_inner(), vec![7, 8]);
    }
}
