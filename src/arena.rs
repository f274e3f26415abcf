// 该文件是 Xunying （巡影） 项目的一部分。
// src/arena.rs - 单帧张量内存池
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

//! 每次迭代的中间张量都从 [`ArenaScope`] 中分配。
//! 作用域在任何退出路径上被丢弃时，未归还的缓冲区都视为已释放，
//! 归还的缓冲区进入池中供下一帧复用。

use tracing::{debug, trace};

const DEFAULT_MAX_POOLED: usize = 8;

#[derive(Debug)]
pub struct TensorArena {
  pool: Vec<Vec<f32>>,
  max_pooled: usize,
  outstanding: usize,
  outstanding_bytes: usize,
  peak_bytes: usize,
}

impl Default for TensorArena {
  fn default() -> Self {
    Self::new(DEFAULT_MAX_POOLED)
  }
}

impl TensorArena {
  pub fn new(max_pooled: usize) -> Self {
    Self {
      pool: Vec::new(),
      max_pooled,
      outstanding: 0,
      outstanding_bytes: 0,
      peak_bytes: 0,
    }
  }

  /// 开启一次迭代的分配作用域
  pub fn scope(&mut self) -> ArenaScope<'_> {
    ArenaScope {
      arena: self,
      issued: 0,
      recycled: 0,
    }
  }

  /// 当前作用域中尚未归还的缓冲区数量
  pub fn outstanding(&self) -> usize {
    self.outstanding
  }

  pub fn outstanding_bytes(&self) -> usize {
    self.outstanding_bytes
  }

  /// 单个作用域内分配字节数的历史峰值
  pub fn peak_bytes(&self) -> usize {
    self.peak_bytes
  }

  pub fn pooled(&self) -> usize {
    self.pool.len()
  }

  fn take(&mut self, len: usize) -> Vec<f32> {
    let best = self
      .pool
      .iter()
      .enumerate()
      .filter(|(_, buf)| buf.capacity() >= len)
      .min_by_key(|(_, buf)| buf.capacity())
      .map(|(idx, _)| idx);

    let mut buf = match best {
      Some(idx) => self.pool.swap_remove(idx),
      None => self.pool.pop().unwrap_or_default(),
    };
    buf.clear();
    buf.resize(len, 0.0);
    buf
  }

  fn give_back(&mut self, buf: Vec<f32>) {
    if self.pool.len() < self.max_pooled {
      self.pool.push(buf);
    }
  }
}

pub struct ArenaScope<'a> {
  arena: &'a mut TensorArena,
  issued: usize,
  recycled: usize,
}

impl ArenaScope<'_> {
  /// 分配一个长度为 `len` 的全零缓冲区
  pub fn alloc(&mut self, len: usize) -> Vec<f32> {
    let buf = self.arena.take(len);
    self.issued += 1;
    self.arena.outstanding += 1;
    self.arena.outstanding_bytes += len * size_of::<f32>();
    self.arena.peak_bytes = self.arena.peak_bytes.max(self.arena.outstanding_bytes);
    trace!("分配张量缓冲区: {} 个元素", len);
    buf
  }

  /// 归还缓冲区，使其可被后续分配复用
  pub fn recycle(&mut self, buf: Vec<f32>) {
    self.recycled += 1;
    self.arena.outstanding = self.arena.outstanding.saturating_sub(1);
    self.arena.outstanding_bytes = self
      .arena
      .outstanding_bytes
      .saturating_sub(buf.len() * size_of::<f32>());
    self.arena.give_back(buf);
  }
}

impl Drop for ArenaScope<'_> {
  fn drop(&mut self) {
    if self.issued > self.recycled {
      debug!(
        "作用域结束，{} 个缓冲区未归还，随所有者一起释放",
        self.issued - self.recycled
      );
    }
    self.arena.outstanding = 0;
    self.arena.outstanding_bytes = 0;
  }
}
