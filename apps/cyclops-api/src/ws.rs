//! WebSocket 收发泵。
//!
//! 写协程独占 socket 写端，按顺序发送连接队列里的消息；读循环把收到的消息交给会话。
//! 任一方向结束、或连接被 terminate，整条连接即结束，返回断开原因。

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use cyclops_realtime::{Inbound, Outbound, OutboundReceiver, SessionHandler};
use futures_util::{SinkExt, StreamExt};
use tracing::debug;

fn to_ws_message(message: Outbound) -> Message {
    match message {
        Outbound::Text(text) => Message::Text(text.into()),
        Outbound::Binary(frame) => Message::Binary(frame),
        Outbound::Ping => Message::Ping(bytes::Bytes::new()),
        Outbound::Close { code, reason } => Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })),
    }
}

/// 运行到连接结束，返回断开原因。
pub async fn pump<H: SessionHandler>(
    socket: WebSocket,
    outbound: OutboundReceiver,
    handler: &H,
) -> String {
    let (mut sink, mut stream) = socket.split();
    let (mut queue, mut shutdown) = outbound.into_parts();

    let mut writer = tokio::spawn(async move {
        while let Some(message) = queue.recv().await {
            let closing = matches!(message, Outbound::Close { .. });
            if sink.send(to_ws_message(message)).await.is_err() {
                return "write failed";
            }
            if closing {
                return "closed by server";
            }
        }
        "outbound closed"
    });

    let reason = loop {
        tokio::select! {
            _ = shutdown.wait() => break "terminated".to_string(),
            result = &mut writer => {
                break result.unwrap_or("writer aborted").to_string();
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    handler.on_message(Inbound::Text(text.as_str().to_owned())).await;
                }
                Some(Ok(Message::Binary(data))) => {
                    handler.on_message(Inbound::Binary(data)).await;
                }
                Some(Ok(Message::Pong(_))) => handler.on_message(Inbound::Pong).await,
                // Ping 由 axum 自动回复
                Some(Ok(Message::Ping(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    break frame.map_or_else(
                        || "closed by peer".to_string(),
                        |frame| format!("closed by peer ({})", frame.code),
                    );
                }
                Some(Err(err)) => {
                    debug!(target: "cyclops.api", error = %err, "socket_read_failed");
                    break "socket error".to_string();
                }
                None => break "socket closed".to_string(),
            }
        }
    };
    writer.abort();
    reason
}
