// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! Message routing through hosted actors.
use actor::{
    Actor, ActorContext, ActorPath, ActorSystem, Envelope, Error, HandlerShape,
    HandlerTable, Message, Query, Reply, SystemConfig, SystemRef,
};
use async_trait::async_trait;
use std::{any::type_name, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct TypeA;

impl Message for TypeA {}

#[derive(Debug, Clone)]
pub struct TypeB(pub i32);

impl Message for TypeB {}

#[derive(Debug, Clone)]
pub struct TypeC;

impl Message for TypeC {}

#[derive(Debug, Clone)]
pub struct Count;

impl Message for Count {}

impl Query for Count {
    type Result = usize;
}

#[derive(Debug, Clone)]
pub struct Reject(pub String);

impl Message for Reject {}

#[derive(Debug, Clone)]
pub struct Echo(pub String);

impl Message for Echo {}

/// Uses the default routing: every handler shape is reachable.
#[derive(Debug, Default)]
pub struct Router {
    handled: usize,
}

#[async_trait]
impl Actor for Router {
    fn kind() -> &'static str {
        "router"
    }

    fn define(table: &mut HandlerTable<Self>) -> Result<(), Error> {
        table
            .on(|router: &mut Router, _msg: TypeA, _ctx| {
                router.handled += 1;
                Ok(())
            })?
            .on_result(|router: &mut Router, msg: TypeB, _ctx| {
                router.handled += 1;
                Ok(msg.0 + 1)
            })?
            .on_query(|router: &mut Router, _msg: Count, _ctx| Ok(router.handled))?
            .on(|_router: &mut Router, msg: Reject, _ctx| {
                Err(Error::Functional(msg.0))
            })?
            .on_async_result(|router: &mut Router, msg: Echo, _ctx| {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    router.handled += 1;
                    Ok(msg.0)
                })
            })?;
        Ok(())
    }
}

/// Routes everything through the synchronous void entry point, except `Count`.
#[derive(Debug, Default)]
pub struct Strict {
    handled: usize,
}

#[async_trait]
impl Actor for Strict {
    fn kind() -> &'static str {
        "strict"
    }

    fn define(table: &mut HandlerTable<Self>) -> Result<(), Error> {
        table
            .on(|strict: &mut Strict, _msg: TypeA, _ctx| {
                strict.handled += 1;
                Ok(())
            })?
            .on_result(|strict: &mut Strict, msg: TypeB, _ctx| {
                strict.handled += 1;
                Ok(msg.0 + 1)
            })?
            .on_query(|strict: &mut Strict, _msg: Count, _ctx| Ok(strict.handled))?;
        Ok(())
    }

    async fn on_receive(
        &mut self,
        message: Envelope,
        ctx: &mut ActorContext<Self>,
    ) -> Result<Reply, Error> {
        let prototype = Arc::clone(ctx.prototype());
        if message.is::<Count>() {
            return prototype
                .dispatch_result(self, message, ctx)
                .map(Reply::Value);
        }
        prototype.dispatch(self, message, ctx)?;
        Ok(Reply::Empty)
    }
}

async fn create_system() -> SystemRef {
    let (system, _runner) =
        ActorSystem::create(SystemConfig::default(), CancellationToken::new());
    system
        .register(|_path: &ActorPath| Router::default())
        .await
        .unwrap();
    system
        .register(|_path: &ActorPath| Strict::default())
        .await
        .unwrap();
    system
}

#[tokio::test]
async fn test_each_shape_through_ask() {
    let system = create_system().await;
    let router = system.actor_of::<Router>("r-1").await.unwrap();

    router.ask::<TypeA, ()>(TypeA).await.unwrap();
    assert_eq!(router.ask::<TypeB, i32>(TypeB(41)).await.unwrap(), 42);
    assert_eq!(
        router.ask::<Echo, String>(Echo("hi".to_owned())).await.unwrap(),
        "hi"
    );
    assert_eq!(router.ask_query(Count).await.unwrap(), 3);
}

#[tokio::test]
async fn test_unhandled_type_is_reported() {
    let system = create_system().await;
    let router = system.actor_of::<Router>("r-2").await.unwrap();

    let error = router.request(Envelope::new(TypeC)).await.unwrap_err();
    assert_eq!(
        error,
        Error::NoHandler {
            actor: "router".to_owned(),
            message: type_name::<TypeC>().to_owned(),
        }
    );
    assert_eq!(router.ask_query(Count).await.unwrap(), 0);
}

#[tokio::test]
async fn test_handler_error_reaches_caller_unchanged() {
    let system = create_system().await;
    let router = system.actor_of::<Router>("r-3").await.unwrap();

    let error = router
        .ask::<Reject, ()>(Reject("not today".to_owned()))
        .await
        .unwrap_err();
    assert_eq!(error, Error::Functional("not today".to_owned()));
}

#[tokio::test]
async fn test_reply_type_mismatch() {
    let system = create_system().await;
    let router = system.actor_of::<Router>("r-4").await.unwrap();

    assert!(matches!(
        router.ask::<TypeA, i32>(TypeA).await,
        Err(Error::UnexpectedType { .. })
    ));
    assert!(matches!(
        router.ask::<TypeB, String>(TypeB(1)).await,
        Err(Error::UnexpectedType { .. })
    ));
    let reply = router.request(Envelope::new(TypeA)).await.unwrap();
    assert!(reply.is_empty());
}

#[tokio::test]
async fn test_strict_entry_point_rejects_value_handler() {
    let system = create_system().await;
    let strict = system.actor_of::<Strict>("s-1").await.unwrap();

    strict.tell(TypeA).await.unwrap();
    let error = strict.ask::<TypeB, ()>(TypeB(1)).await.unwrap_err();
    assert_eq!(
        error,
        Error::InvalidHandlerShape {
            actor: "strict".to_owned(),
            message: type_name::<TypeB>().to_owned(),
            expected: HandlerShape::SyncVoid,
            found: HandlerShape::SyncValue,
        }
    );
    assert_eq!(strict.ask_query(Count).await.unwrap(), 1);
}

#[tokio::test]
async fn test_prototype_is_shared_by_identities() {
    let system = create_system().await;
    let prototype = system.prototype::<Router>().await.unwrap();
    assert_eq!(prototype.kind(), "router");
    assert_eq!(prototype.table().len(), 5);
    assert_eq!(
        prototype.table().descriptor::<Echo>().unwrap().shape(),
        HandlerShape::AsyncValue
    );

    let again = system
        .register(|_path: &ActorPath| Router::default())
        .await
        .unwrap();
    assert!(Arc::ptr_eq(&prototype, &again));

    let first = system.actor_of::<Router>("a").await.unwrap();
    let second = system.actor_of::<Router>("b").await.unwrap();
    first.tell(TypeA).await.unwrap();
    assert_eq!(first.ask_query(Count).await.unwrap(), 1);
    assert_eq!(second.ask_query(Count).await.unwrap(), 0);
}
