use callrelay_voice::codec::{ulaw_compress, ulaw_expand};
use callrelay_voice::media::{encode_media, parse_event};
use callrelay_voice::{
    decode_telephony_frame, encode_agent_frame, open_agent_channel, Frame, TelephonyEvent,
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

#[test]
fn test_every_code_word_round_trips_except_negative_zero() {
    let frame: Vec<u8> = (0u8..=255).filter(|&b| b != 0x7F).collect();

    let pcm = decode_telephony_frame(&frame).expect("decode should succeed");
    assert_eq!(pcm.len(), frame.len() * 2);

    let back = encode_agent_frame(&pcm).expect("encode should succeed");
    assert_eq!(back, frame);
}

#[test]
fn test_negative_zero_reencodes_as_positive_zero() {
    assert_eq!(ulaw_compress(ulaw_expand(0x7F)), 0xFF);
}

#[test]
fn test_media_envelope_carries_transcoded_audio() {
    let pcm = vec![0u8; 320];
    let mu_law = encode_agent_frame(&pcm).unwrap();
    let text = encode_media("MZ42", &mu_law).unwrap();

    match parse_event(&text).unwrap() {
        TelephonyEvent::Media(payload) => {
            assert_eq!(payload.len(), 160);
            assert!(payload.iter().all(|&b| b == 0xFF));
        }
        other => panic!("expected media, got {:?}", other),
    }
}

#[tokio::test]
async fn test_agent_channel_relays_frames_both_ways() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();

        let first = socket.next().await.unwrap().unwrap();
        assert_eq!(first, Message::Binary(vec![1u8, 2, 3, 4].into()));

        socket
            .send(Message::Text(r#"{"type":"state","state":"listening"}"#.into()))
            .await
            .unwrap();
        socket.send(Message::Binary(vec![9u8, 9].into())).await.unwrap();
        socket.close(None).await.unwrap();
    });

    let mut channel = open_agent_channel(&format!("ws://{}", addr))
        .await
        .expect("agent channel should open");

    channel.tx.send(Frame::Binary(vec![1, 2, 3, 4])).await.unwrap();

    assert_eq!(
        channel.rx.recv().await,
        Some(Frame::Text(r#"{"type":"state","state":"listening"}"#.to_string()))
    );
    assert_eq!(channel.rx.recv().await, Some(Frame::Binary(vec![9, 9])));
    assert_eq!(channel.rx.recv().await, None);

    server.await.unwrap();
}

#[tokio::test]
async fn test_agent_channel_connect_failure_is_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = open_agent_channel(&format!("ws://{}", addr))
        .await
        .expect_err("connect to a closed port must fail");
    assert!(matches!(err, callrelay_voice::VoiceError::AgentConnect(_)));
}
