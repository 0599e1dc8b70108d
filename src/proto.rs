//! Generated gRPC/protobuf types for the `pipeline.kernel.v1` package.

tonic::include_proto!("pipeline.kernel.v1");
