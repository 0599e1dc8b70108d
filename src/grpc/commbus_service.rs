//! CommBusService — pub/sub events, fire-and-forget commands, and queries
//! over the kernel's `CommBus`.

use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status};

use crate::commbus::{Command, Event, Query};
use crate::kernel::Kernel;
use crate::proto::comm_bus_service_server::CommBusService as CommBusServiceTrait;
use crate::proto::{
    BusEvent, PublishRequest, PublishResponse, QueryRequest, QueryResponse, SendCommandRequest,
    SendCommandResponse, SubscribeRequest,
};

const DEFAULT_QUERY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone)]
pub struct CommBusServiceImpl {
    kernel: Arc<Mutex<Kernel>>,
}

impl CommBusServiceImpl {
    pub fn new(kernel: Arc<Mutex<Kernel>>) -> Self {
        Self { kernel }
    }
}

#[tonic::async_trait]
impl CommBusServiceTrait for CommBusServiceImpl {
    async fn publish(
        &self,
        request: Request<PublishRequest>,
    ) -> Result<Response<PublishResponse>, Status> {
        let req = request.into_inner();
        let mut kernel = self.kernel.lock().await;
        let delivered = kernel
            .commbus
            .publish(Event {
                event_type: req.event_type,
                payload: req.payload,
                timestamp_ms: Utc::now().timestamp_millis(),
                source: req.source,
            })
            .await
            .map_err(|e| e.to_grpc_status())?;

        Ok(Response::new(PublishResponse {
            delivered_count: delivered as u32,
        }))
    }

    async fn send(
        &self,
        request: Request<SendCommandRequest>,
    ) -> Result<Response<SendCommandResponse>, Status> {
        let req = request.into_inner();
        let mut kernel = self.kernel.lock().await;
        let result = kernel
            .commbus
            .send_command(Command {
                command_type: req.command_type,
                payload: req.payload,
                source: req.source,
            })
            .await;

        Ok(Response::new(SendCommandResponse {
            accepted: result.is_ok(),
        }))
    }

    async fn query(
        &self,
        request: Request<QueryRequest>,
    ) -> Result<Response<QueryResponse>, Status> {
        let req = request.into_inner();
        let mut kernel = self.kernel.lock().await;
        let result = kernel
            .commbus
            .query(Query {
                query_type: req.query_type,
                payload: req.payload,
                timeout_ms: req.timeout_ms.unwrap_or(DEFAULT_QUERY_TIMEOUT_MS),
                source: req.source,
            })
            .await;

        Ok(Response::new(match result {
            Ok(r) => QueryResponse {
                success: r.success,
                result: r.result,
                error: if r.error.is_empty() { None } else { Some(r.error) },
            },
            Err(e) => QueryResponse {
                success: false,
                result: vec![],
                error: Some(e.to_string()),
            },
        }))
    }

    type SubscribeStream = Pin<Box<dyn Stream<Item = Result<BusEvent, Status>> + Send>>;

    async fn subscribe(
        &self,
        request: Request<SubscribeRequest>,
    ) -> Result<Response<Self::SubscribeStream>, Status> {
        let req = request.into_inner();
        let kernel = self.kernel.clone();

        let (_subscription, rx) = {
            let mut kernel_guard = kernel.lock().await;
            kernel_guard
                .commbus
                .subscribe(req.subscriber_id, req.event_types)
                .await
                .map_err(|e| e.to_grpc_status())?
        };

        let stream = tokio_stream::wrappers::UnboundedReceiverStream::new(rx).map(|event| {
            Ok(BusEvent {
                event_type: event.event_type,
                payload: event.payload,
                timestamp_ms: event.timestamp_ms,
                source: event.source,
            })
        });

        Ok(Response::new(Box::pin(stream)))
    }
}
