//! Live frames published from another thread through a streaming pipeline

use bsp_core::{Selection, TimeSeriesBuffer};
use bsp_io::{channel, encode, LiveSource};
use bsp_processing::{DataProvider, Pipeline};
use std::thread;

#[test]
fn test_threaded_publisher_feeds_window_pipeline() {
    let (sender, subscriber) = channel(2);
    let publisher = thread::spawn(move || {
        for frame in 0..5 {
            let values: Vec<f32> = (0..40).map(|i| (frame * 40 + i) as f32).collect();
            let buffer = TimeSeriesBuffer::from_vec(values, 2, 20.0, None).unwrap();
            if sender.send(encode(&buffer, frame as f64).unwrap()).is_err() {
                break;
            }
        }
    });

    let source = LiveSource::new(subscriber).with_columns(["flexor", "extensor"]);
    let pipeline = Pipeline::builder("live-windows", &source)
        .window(0.5, Some(0.5))
        .unwrap()
        .build()
        .unwrap();
    assert!(pipeline.is_unbounded());

    // 20 samples per frame at 20 Hz: two 10-sample windows each
    let windows: Vec<TimeSeriesBuffer> = pipeline
        .get_data(&Selection::default().channels(["extensor"]))
        .unwrap()
        .into_iter()
        .take(6)
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(windows.len(), 6);
    assert!(windows.iter().all(|w| w.shape() == (10, 1)));
    assert_eq!(windows[2].value(0, 0), Some(41.0));

    drop(pipeline);
    drop(source);
    publisher.join().unwrap();
}
