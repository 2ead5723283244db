use futures::{StreamExt, stream};

use super::*;

fn chunks(parts: &[&'static str]) -> Vec<std::result::Result<&'static str, std::io::Error>> {
    parts.iter().map(|part| Ok(*part)).collect()
}

#[tokio::test]
async fn test_next_frame_across_chunks() {
    let mut reader = FrameReader::new(stream::iter(chunks(&[
        "event: token\nda",
        "ta: Hel\n",
        "\nevent: token\ndata: lo\n\nevent: done\ndata: [DONE]\n\n",
    ])));

    assert_eq!(reader.next_frame().await.unwrap(), Some(Frame::token("Hel")));
    assert_eq!(reader.next_frame().await.unwrap(), Some(Frame::token("lo")));
    assert_eq!(reader.next_frame().await.unwrap(), Some(Frame::done()));
    assert_eq!(reader.next_frame().await.unwrap(), None);
    assert_eq!(reader.next_frame().await.unwrap(), None);
}

#[tokio::test]
async fn test_incomplete_trailing_frame_is_dropped() {
    let mut reader = FrameReader::new(stream::iter(chunks(&[
        "event: token\ndata: ok\n\n",
        "event: token\ndata: cut",
    ])));

    assert_eq!(reader.next_frame().await.unwrap(), Some(Frame::token("ok")));
    assert_eq!(reader.next_frame().await.unwrap(), None);
}

#[tokio::test]
async fn test_into_stream_stops_after_error() {
    let parts: Vec<std::result::Result<&'static str, std::io::Error>> = vec![
        Ok("event: token\ndata: a\n\n"),
        Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "reset")),
        Ok("event: token\ndata: b\n\n"),
    ];
    let frames = FrameReader::new(stream::iter(parts))
        .into_stream()
        .collect::<Vec<_>>()
        .await;

    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].as_ref().unwrap(), &Frame::token("a"));
    assert!(frames[1].is_err());
}
