/// 默认状态结构和常用路径
///
/// 外围代码（绘图工具、PDF渲染、UI面板）通过这些路径读写状态；
/// 状态树是开放结构，任何路径都可以订阅，不需要预先声明。

use serde_json::{json, Value};

lazy_static! {
    static ref DEFAULT_STATE: Value = json!({
        "document": {
            "filePath": null,
            "fileName": null,
            "fileType": null,
            "isLoaded": false,
            "isModified": false
        },
        "page": {
            "currentPageNum": 1,
            "totalPages": 0,
            "viewMode": "single"
        },
        "canvas": {
            "currentZoom": 1.0,
            "rotation": 0,
            "fitMode": "width"
        },
        "drawing": {
            "currentTool": "pen",
            "lineWidth": 2.0,
            "color": "#e53935",
            "opacity": 1.0,
            "fontSize": 16
        },
        "annotations": {
            "byPage": {},
            "selectedId": null
        },
        "history": {
            "undoStack": [],
            "redoStack": []
        },
        "ui": {
            "sidebarVisible": true,
            "activePanel": "thumbnails",
            "isPrinting": false
        }
    });
}

/// 默认状态树的新副本
pub fn default_state() -> Value {
    DEFAULT_STATE.clone()
}

pub mod paths {
    use crate::state::types::StatePath;

    pub const DOCUMENT_PATH: StatePath<Option<String>> = StatePath::new("document.filePath");
    pub const DOCUMENT_LOADED: StatePath<bool> = StatePath::new("document.isLoaded");
    pub const DOCUMENT_MODIFIED: StatePath<bool> = StatePath::new("document.isModified");

    pub const CURRENT_PAGE: StatePath<u32> = StatePath::new("page.currentPageNum");
    pub const TOTAL_PAGES: StatePath<u32> = StatePath::new("page.totalPages");

    pub const ZOOM: StatePath<f64> = StatePath::new("canvas.currentZoom");
    pub const ROTATION: StatePath<u16> = StatePath::new("canvas.rotation");

    pub const CURRENT_TOOL: StatePath<String> = StatePath::new("drawing.currentTool");
    pub const LINE_WIDTH: StatePath<f64> = StatePath::new("drawing.lineWidth");
    pub const STROKE_COLOR: StatePath<String> = StatePath::new("drawing.color");

    pub const SELECTED_ANNOTATION: StatePath<Option<String>> = StatePath::new("annotations.selectedId");
    pub const SIDEBAR_VISIBLE: StatePath<bool> = StatePath::new("ui.sidebarVisible");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::path::resolve;

    #[test]
    fn test_default_state_contains_well_known_paths() {
        let state = default_state();
        for path in [
            paths::CURRENT_PAGE.as_str(),
            paths::ZOOM.as_str(),
            paths::LINE_WIDTH.as_str(),
            paths::CURRENT_TOOL.as_str(),
            paths::DOCUMENT_PATH.as_str(),
        ] {
            assert!(resolve(&state, path).is_some(), "missing default for {}", path);
        }
        assert!(state["history"]["undoStack"].is_array());
    }
}
