// 该文件是 Xunying （巡影） 项目的一部分。
// src/labels.rs - 类别名称表
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{borrow::Cow, path::Path};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelsError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标签文件格式错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 类别下标到名称的映射，未知下标回退为 `class_<id>`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassLabels {
  names: Vec<String>,
}

impl ClassLabels {
  pub fn new(names: Vec<String>) -> Self {
    Self { names }
  }

  /// 读取 JSON 字符串数组，例如 `["person", "car"]`
  pub fn load(path: &Path) -> Result<Self, LabelsError> {
    let text = std::fs::read_to_string(path)?;
    let names: Vec<String> = serde_json::from_str(&text)?;
    Ok(Self { names })
  }

  pub fn name(&self, class_id: usize) -> Cow<'_, str> {
    match self.names.get(class_id) {
      Some(name) => Cow::Borrowed(name.as_str()),
      None => Cow::Owned(format!("class_{}", class_id)),
    }
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn falls_back_to_index() {
    let labels = ClassLabels::new(vec!["helmet".into(), "vest".into()]);
    assert_eq!(labels.name(1), "vest");
    assert_eq!(labels.name(7), "class_7");
    assert_eq!(ClassLabels::default().name(0), "class_0");
  }

  #[test]
  fn loads_json_array() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("labels.json");
    std::fs::write(&path, r#"["a", "b", "c"]"#).unwrap();
    let labels = ClassLabels::load(&path).unwrap();
    assert_eq!(labels.len(), 3);
    assert_eq!(labels.name(2), "c");

    std::fs::write(&path, r#"{"a": 1}"#).unwrap();
    assert!(matches!(
      ClassLabels::load(&path),
      Err(LabelsError::JsonError(_))
    ));
  }
}
