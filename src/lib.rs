//! Annotation engine for screenshot editors: object model, gestures, undo
//! history and a rasterizer that burns annotations into the captured bitmap.

pub mod annotation;
pub mod crop;
pub mod error;
pub mod flatten;
pub mod geometry;
pub mod gesture;
pub mod history;
pub mod overlay;
pub mod scene;
pub mod settings;
pub mod state;
pub mod text;

pub use annotation::{Annotation, AnnotationId, AnnotationKind, Handle, StrokeWidth, TextSize, Tool};
pub use error::{EditorError, EditorResult};
pub use geometry::CoordinateMapper;
pub use gesture::PointerEvent;
pub use overlay::{ImageRun, OverlayFrame, OverlayItem, TextRun};
pub use settings::EditorSettings;
pub use state::{BaseImage, EditorState};
