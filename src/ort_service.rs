use crate::{
    config::{InferenceConfig, ModelConfig},
    detection::{non_max_suppression, BoundingBox, Detection},
    model_service::{ModelService, ModelServiceError},
};
use image::{imageops::FilterType, RgbImage};
use ndarray::{Array, ArrayD, ArrayViewD, Axis, Ix4};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex, MutexGuard,
};

const PAD_VALUE: f32 = 114. / 255.;

/// Placement of the resized image inside the square model input.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
    width: u32,
    height: u32,
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn new(img_width: u32, img_height: u32, size: u32) -> Self {
        let scale_x = size as f32 / img_width as f32;
        let scale_y = size as f32 / img_height as f32;
        let scale = scale_x.min(scale_y);
        let width = ((img_width as f32 * scale).round() as u32).clamp(1, size);
        let height = ((img_height as f32 * scale).round() as u32).clamp(1, size);

        Self {
            scale,
            width,
            height,
            pad_x: (size - width) / 2,
            pad_y: (size - height) / 2,
        }
    }

    /// Maps a center-format box from model input space back to the source image.
    fn to_original(&self, xc: f32, yc: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox::from_center(
            (xc - self.pad_x as f32) / self.scale,
            (yc - self.pad_y as f32) / self.scale,
            w / self.scale,
            h / self.scale,
        )
    }
}

/// Letterboxes to `size`x`size` (aspect ratio kept, grey padding) and lays
/// the pixels out as a normalised NCHW tensor.
fn transform_image(image: &RgbImage, size: u32) -> (Array<f32, Ix4>, Letterbox) {
    let (img_width, img_height) = image.dimensions();
    let letterbox = Letterbox::new(img_width, img_height, size);
    let img = image::imageops::resize(
        image,
        letterbox.width,
        letterbox.height,
        FilterType::Triangle,
    );

    let mut input = Array::from_elem((1, 3, size as usize, size as usize), PAD_VALUE);
    for (x, y, pixel) in img.enumerate_pixels() {
        let x = (x + letterbox.pad_x) as usize;
        let y = (y + letterbox.pad_y) as usize;
        let [r, g, b] = pixel.0;
        input[[0, 0, y, x]] = (r as f32) / 255.;
        input[[0, 1, y, x]] = (g as f32) / 255.;
        input[[0, 2, y, x]] = (b as f32) / 255.;
    }

    (input, letterbox)
}

/// Turns a YOLOv8 head output of shape `[1, 4 + num_classes, candidates]`
/// into detections in original image coordinates.
fn decode_output(
    output: ArrayViewD<'_, f32>,
    config: &InferenceConfig,
    letterbox: &Letterbox,
) -> Result<Vec<Detection>, ModelServiceError> {
    let shape = output.shape();
    if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
        return Err(ModelServiceError::Output(format!(
            "expected shape [1, 4 + classes, candidates], got {:?}",
            shape
        )));
    }

    let output = output.index_axis(Axis(0), 0);

    let mut boxes = Vec::new();
    for column in output.axis_iter(Axis(1)) {
        let Some((class_id, prob)) = column
            .iter()
            .skip(4)
            .copied()
            .enumerate()
            .filter(|(_, score)| score.is_finite())
            .reduce(|accum, item| if item.1 > accum.1 { item } else { accum })
        else {
            continue;
        };

        if prob < config.min_probability {
            continue;
        }

        boxes.push(Detection {
            class_id,
            confidence: prob,
            bbox: letterbox.to_original(column[0], column[1], column[2], column[3]),
        });
    }

    Ok(non_max_suppression(boxes, config.iou_threshold))
}

/// Locks a pool slot. A panic during a previous run leaves the session
/// itself usable, so poisoning is cleared instead of failing the slot.
fn lock_slot<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    slot.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("Recovering poisoned session lock");
        poisoned.into_inner()
    })
}

#[derive(Clone)]
pub struct OrtModelService {
    sessions: Arc<Vec<Mutex<Session>>>,
    counter: Arc<AtomicUsize>,
    output_name: String,
}

impl OrtModelService {
    pub fn new(model_config: &ModelConfig) -> Result<Self, ort::Error> {
        let num_instances = model_config.num_instances.max(1);
        let sessions = (0..num_instances)
            .map(|_| {
                let session = Session::builder()?
                    .with_optimization_level(GraphOptimizationLevel::Level3)?
                    .commit_from_file(model_config.get_path())?;
                Ok(Mutex::new(session))
            })
            .collect::<Result<Vec<_>, ort::Error>>()?;

        tracing::info!(
            "Created {} ONNX sessions from {:?}",
            num_instances,
            model_config.get_path()
        );

        Ok(Self {
            sessions: Arc::new(sessions),
            counter: Arc::new(AtomicUsize::new(0)),
            output_name: model_config.output_name.clone(),
        })
    }

    /// The `names` entry Ultralytics writes into the exported model's
    /// custom metadata, e.g. `{0: 'paregi', 1: 'pelise'}`.
    pub fn class_names_metadata(&self) -> Result<Option<String>, ort::Error> {
        let session = lock_slot(&self.sessions[0]);
        let names = session.metadata()?.custom("names")?;
        Ok(names)
    }

    /// Number of classes the detection head scores, when the output shape is
    /// static.
    pub fn num_classes(&self) -> Option<usize> {
        let session = lock_slot(&self.sessions[0]);
        let output = session
            .outputs
            .iter()
            .find(|output| output.name == self.output_name)?;
        let shape = output.output_type.tensor_shape()?;

        match shape[..] {
            [_, rows, _] if rows > 4 => Some((rows - 4) as usize),
            _ => None,
        }
    }

    fn run_inference(&self, input: &Array<f32, Ix4>) -> Result<ArrayD<f32>, ModelServiceError> {
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % self.sessions.len();
        let mut session = lock_slot(&self.sessions[index]);

        tracing::debug!("Handling request with session {}", index);
        let tensor_ref = TensorRef::from_array_view(input.view())
            .map_err(|e| ModelServiceError::Inference(format!("failed to build tensor: {}", e)))?;

        let outputs = session
            .run(ort::inputs![tensor_ref])
            .map_err(|e| ModelServiceError::Inference(e.to_string()))?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            ModelServiceError::Output(format!("missing output tensor `{}`", self.output_name))
        })?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| ModelServiceError::Output(format!("failed to extract tensor: {}", e)))?;

        ArrayD::from_shape_vec(shape.to_ixdyn(), data.to_vec())
            .map_err(|e| ModelServiceError::Output(format!("invalid tensor shape: {}", e)))
    }
}

impl ModelService for OrtModelService {
    fn detect(
        &self,
        image: &RgbImage,
        config: &InferenceConfig,
    ) -> Result<Vec<Detection>, ModelServiceError> {
        let (img_width, img_height) = image.dimensions();
        if img_width == 0 || img_height == 0 {
            return Err(ModelServiceError::InvalidImage(
                "image has no pixels".to_string(),
            ));
        }

        let (input, letterbox) = transform_image(image, config.image_size);
        let outputs = self.run_inference(&input)?;

        decode_output(outputs.view(), config, &letterbox)
    }
}
