//! 通道属性：初始化阶段附着到新通道上的用户数据。
//!
//! 与选项不同，属性不被通道解释，只是按名称存取的任意值；因此值以类型擦除的
//! [`AttributeValue`] 保存，读取时再按 [`AttributeKey<T>`] 的类型向下转型。

use std::{any::Any, fmt, marker::PhantomData, sync::Arc};

/// 带类型的属性键。
pub struct AttributeKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AttributeKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for AttributeKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for AttributeKey<T> {}

impl<T> fmt::Debug for AttributeKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AttributeKey").field(&self.name).finish()
    }
}

trait ErasedValue: Any + Send + Sync {
    fn as_any(&self) -> &(dyn Any + Send + Sync);
    fn debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result;
}

impl<T> ErasedValue for T
where
    T: Any + Send + Sync + fmt::Debug,
{
    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        self
    }

    fn debug(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// 类型擦除后的属性值；克隆只复制引用计数。
#[derive(Clone)]
pub struct AttributeValue {
    inner: Arc<dyn ErasedValue>,
}

impl AttributeValue {
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send + Sync + fmt::Debug,
    {
        Self {
            inner: Arc::new(value),
        }
    }

    /// 按类型读取；类型不匹配时返回 `None`。
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.as_any().downcast_ref::<T>()
    }

    /// 是否指向同一份数据。
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.debug(f)
    }
}
